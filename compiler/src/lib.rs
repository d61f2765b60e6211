// ugg — unit generator generator
//
// Library root. Frontend (lexer, parser, lower), unit graph model
// (node, builder), per-variant passes (enumerate, schedule, rate_infer,
// rewrite) and backends (codegen, dot), driven by `pipeline`.

pub mod ast;
pub mod builder;
pub mod codegen;
pub mod diag;
pub mod dot;
pub mod enumerate;
pub mod error;
pub mod id;
pub mod lexer;
pub mod lower;
pub mod node;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod rate;
pub mod rate_infer;
pub mod rewrite;
pub mod schedule;
