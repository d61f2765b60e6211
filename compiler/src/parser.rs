// Parser for .ugg unit definition files.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;
use crate::node::BinOp;
use crate::rate::{Category, Rate, RateSet};

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub program: Option<Program>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a unit definition source string. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = program_parser(source);
    let (program, parse_errors) = parser.parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        program,
        errors: all_errors,
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    let span: SimpleSpan = (lhs.span.start()..rhs.span.end()).into();
    Expr {
        kind: ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    }
}

// ── Main parser builder ──
//
// All grammar rules are built inside `program_parser` so that the `source`
// reference is captured once and shared by all combinators.

fn program_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Program, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let classify_number = move |n: f64, span: SimpleSpan| {
        let lexeme = &source[span.start()..span.end()];
        let is_int_literal =
            !lexeme.contains('.') && !lexeme.contains('e') && !lexeme.contains('E');
        match lexeme.parse::<i64>() {
            Ok(v) if is_int_literal => ExprKind::Int(v),
            _ => ExprKind::Float(n),
        }
    };

    // ── Newlines ──

    let nl = just(Token::Newline).repeated().ignored();

    // ── Identifier ──

    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    // ── Expressions ──
    //
    // Precedence, loosest first: `<`, `+ -`, `* /`, unary `-`, subscript.

    let expr = recursive(|expr| {
        let number = select! {
            Token::Number(n) = e => Expr {
                kind: classify_number(n, e.span()),
                span: e.span(),
            },
        };

        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let call = ident
            .clone()
            .then(args)
            .map_with(|(func, args), e| Expr {
                kind: ExprKind::Call { func, args },
                span: e.span(),
            });

        let name = ident.clone().map(|id| Expr {
            kind: ExprKind::Name(id.name),
            span: id.span,
        });

        let paren = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let atom = choice((number, call, name, paren));

        let subscript = just(Token::LBracket)
            .ignore_then(expr.clone())
            .then(just(Token::RBracket).map_with(|_, e| e.span()));

        let postfix = atom.foldl(
            subscript.repeated(),
            |target: Expr, (index, close): (Expr, SimpleSpan)| {
                let span: SimpleSpan = (target.span.start()..close.end()).into();
                Expr {
                    kind: ExprKind::Index {
                        target: Box::new(target),
                        index: Box::new(index),
                    },
                    span,
                }
            },
        );

        let unary = just(Token::Minus)
            .map_with(|_, e| e.span())
            .repeated()
            .foldr(postfix, |minus: SimpleSpan, x: Expr| {
                let span: SimpleSpan = (minus.start()..x.span.end()).into();
                Expr {
                    kind: ExprKind::Neg(Box::new(x)),
                    span,
                }
            });

        let product_op = choice((
            just(Token::Star).to(BinOp::Mul),
            just(Token::Slash).to(BinOp::Div),
        ));
        let product = unary
            .clone()
            .foldl(product_op.then(unary).repeated(), |lhs, (op, rhs)| {
                binary(op, lhs, rhs)
            });

        let sum_op = choice((
            just(Token::Plus).to(BinOp::Add),
            just(Token::Minus).to(BinOp::Sub),
        ));
        let sum = product
            .clone()
            .foldl(sum_op.then(product).repeated(), |lhs, (op, rhs)| {
                binary(op, lhs, rhs)
            });

        sum.clone()
            .foldl(just(Token::Lt).to(BinOp::Lt).then(sum).repeated(), |lhs, (op, rhs)| {
                binary(op, lhs, rhs)
            })
    });

    // ── Statements ──

    let ty_annot = just(Token::Colon).ignore_then(ident.clone()).or_not();

    let rates = ident.clone().try_map(|id, span| {
        RateSet::parse(&id.name).map_err(|c| {
            Rich::custom(
                span,
                format!(
                    "unknown rate code '{c}' in '{}' (expected letters from a, b, c)",
                    id.name
                ),
            )
        })
    });

    let param_stmt = just(Token::Param)
        .ignore_then(ident.clone())
        .then(ty_annot.clone())
        .then_ignore(just(Token::At))
        .then(rates)
        .map(|((name, ty), rates)| StmtKind::Param { name, ty, rates });

    let extern_stmt = just(Token::Extern)
        .ignore_then(ident.clone())
        .then(ty_annot.clone())
        .map(|(name, ty)| StmtKind::Extern { name, ty });

    let let_stmt = just(Token::Let)
        .ignore_then(ident.clone())
        .then_ignore(just(Token::Equals))
        .then(expr.clone())
        .map(|(name, value)| StmtKind::Let { name, value });

    let var_stmt = just(Token::Var)
        .ignore_then(ident.clone())
        .then(ty_annot.clone())
        .then_ignore(just(Token::Equals))
        .then(expr.clone())
        .map(|((name, ty), value)| StmtKind::Var { name, ty, value });

    let state_stmt = just(Token::State)
        .ignore_then(ident.clone())
        .then(ty_annot)
        .then_ignore(just(Token::Equals))
        .then(expr.clone())
        .map(|((name, ty), init)| StmtKind::State { name, ty, init });

    let next_stmt = just(Token::Next)
        .ignore_then(ident.clone())
        .then_ignore(just(Token::Equals))
        .then(expr.clone())
        .map(|(state, value)| StmtKind::Next { state, value });

    let output_rate_stmt = just(Token::OutputRate)
        .ignore_then(ident.clone())
        .map(StmtKind::OutputRate);

    let no_interp_stmt = just(Token::NoInterp)
        .ignore_then(ident.clone())
        .map(StmtKind::NoInterp);

    let on_stmt = just(Token::On)
        .ignore_then(ident.clone())
        .then(ident.clone())
        .then_ignore(just(Token::Equals))
        .then(expr.clone())
        .map(|((param, state), value)| StmtKind::On {
            param,
            state,
            value,
        });

    let out_stmt = just(Token::Out).ignore_then(expr).map(StmtKind::Out);

    let statement = choice((
        param_stmt,
        extern_stmt,
        let_stmt,
        var_stmt,
        state_stmt,
        next_stmt,
        output_rate_stmt,
        no_interp_stmt,
        on_stmt,
        out_stmt,
    ))
    .map_with(|kind, e| Stmt {
        kind,
        span: e.span(),
    });

    // ── Unit declaration ──

    let generator_rate = ident.clone().try_map(|id, span| {
        Rate::parse(&id.name).ok_or_else(|| {
            Rich::custom(
                span,
                format!("expected generator output rate (a, b), found '{}'", id.name),
            )
        })
    });

    let category = choice((
        just(Token::Filter).to(Category::Filter),
        just(Token::Generator)
            .ignore_then(generator_rate)
            .map(Category::Generator),
    ));

    let body = nl
        .clone()
        .ignore_then(
            statement
                .separated_by(just(Token::Newline).repeated().at_least(1))
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl.clone());

    let unit = just(Token::Unit)
        .ignore_then(ident)
        .then(category)
        .then(just(Token::Commutative).or_not().map(|c| c.is_some()))
        .then(body.delimited_by(just(Token::LBrace), just(Token::RBrace)))
        .map_with(|(((name, category), commutative), body), e| UnitDecl {
            name,
            category,
            commutative,
            body,
            span: e.span(),
        });

    // ── Program ──

    nl.clone()
        .ignore_then(
            unit.separated_by(just(Token::Newline).repeated().at_least(1))
                .allow_trailing()
                .collect::<Vec<_>>(),
        )
        .then_ignore(nl)
        .map_with(move |units, e| Program {
            units,
            span: e.span(),
        })
}

// ── Tests ──
