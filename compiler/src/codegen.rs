// codegen.rs — C++ code generation for compiled unit variants
//
// Each variant becomes one class derived from `Ugen_outa` (audio output)
// or `Ugen_outb` (block output) with:
//   - a member per parameter, constant-rate variable, state register,
//     and upsample accumulator, in schedule order;
//   - a constructor that stores parameters and initialises members;
//   - `run(long block_num)`: refresh inputs, block-rate work, then either
//     the per-sample loop or the single block output;
//   - one setter per parameter with write actions;
//   - a `<Class>_create` factory, which the lookup table names.
// Declarations and implementations accumulate in per-unit buffers.
//
// Preconditions: every variant passed `verify_rewrite`.
// Postconditions: `UnitArtifacts` holds a header, a source file, and a
//                 lookup table entry per emitted variant.
// Failure modes: parameter types that cannot be passed at their rate, and
//                state initial values or setters reading run() locals,
//                are `GenError`s.
// Side effects: none.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::error::GenError;
use crate::id::NodeId;
use crate::node::*;
use crate::rate::Rate;
use crate::rewrite::Variant;

// ── Public types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct CodegenOptions {
    /// SHA-256 of the definition source, recorded in each file's banner.
    pub source_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantEntry {
    pub class: String,
    pub constructor: String,
    pub output_rate: Rate,
}

/// Parameter rate codes → factory, for runtime dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantTable {
    pub unit: String,
    pub variants: BTreeMap<String, VariantEntry>,
}

impl VariantTable {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

#[derive(Debug, Clone)]
pub struct UnitArtifacts {
    pub unit: String,
    /// Lower-cased unit name: `<stem>.h`, `<stem>.cpp`.
    pub file_stem: String,
    pub header: String,
    pub source: String,
    pub table: VariantTable,
}

// ── Public entry point ──────────────────────────────────────────────────────

pub fn emit_unit(
    unit: &str,
    variants: &[Variant],
    options: &CodegenOptions,
) -> Result<UnitArtifacts, GenError> {
    let mut emitter = UnitEmitter::new(unit, options);
    for variant in variants {
        emitter.emit(variant)?;
    }
    Ok(emitter.finish())
}

/// Accumulates the declaration and implementation streams of one unit.
pub struct UnitEmitter {
    unit: String,
    stem: String,
    header: String,
    source: String,
    table: VariantTable,
}

impl UnitEmitter {
    pub fn new(unit: &str, options: &CodegenOptions) -> Self {
        let stem = unit.to_lowercase();
        let mut header = String::new();
        let mut source = String::new();
        let _ = writeln!(header, "// {stem} declarations");
        let _ = writeln!(source, "// {stem} implementations");
        if let Some(hash) = &options.source_hash {
            let _ = writeln!(header, "// source sha256: {hash}");
            let _ = writeln!(source, "// source sha256: {hash}");
        }
        let _ = writeln!(header, "\n#pragma once\n\n#include \"ugen.h\"\n");
        let _ = writeln!(source, "\n#include \"ugen.h\"\n#include \"{stem}.h\"\n");
        Self {
            unit: unit.to_string(),
            stem,
            header,
            source,
            table: VariantTable {
                unit: unit.to_string(),
                variants: BTreeMap::new(),
            },
        }
    }

    /// Append one variant. On error nothing is appended.
    pub fn emit(&mut self, variant: &Variant) -> Result<(), GenError> {
        let mut ctx = VariantCtx::new(variant);
        ctx.collect()?;
        let setters = ctx.setters()?;
        let class = variant.class_name();
        ctx.write_declaration(&mut self.header, &setters);
        ctx.write_implementation(&mut self.source, &setters);
        self.table.variants.insert(
            variant.combination.key(),
            VariantEntry {
                constructor: format!("{class}_create"),
                class,
                output_rate: variant.output_rate(),
            },
        );
        Ok(())
    }

    pub fn finish(self) -> UnitArtifacts {
        UnitArtifacts {
            unit: self.unit,
            file_stem: self.stem,
            header: self.header,
            source: self.source,
            table: self.table,
        }
    }
}

// ── Internal context ────────────────────────────────────────────────────────

struct Setter {
    param: String,
    arg: String,
    body: Vec<String>,
}

/// Statement buckets for one variant, filled in schedule order.
#[derive(Default)]
struct Sections {
    members: Vec<String>,
    ctor: Vec<String>,
    refresh: Vec<String>,
    block: Vec<String>,
    block_next: Vec<String>,
    upsample_step: Vec<String>,
    audio: Vec<String>,
    audio_next: Vec<String>,
    upsample_update: Vec<String>,
    audio_commit: Vec<String>,
    block_commit: Vec<String>,
}

struct VariantCtx<'a> {
    v: &'a Variant,
    class: String,
    args: Vec<String>,
    s: Sections,
}

impl<'a> VariantCtx<'a> {
    fn new(v: &'a Variant) -> Self {
        Self {
            v,
            class: v.class_name(),
            args: Vec::new(),
            s: Sections::default(),
        }
    }

    fn node(&self, id: NodeId) -> &'a Node {
        &self.v.graph[id]
    }

    // ── Collection ──

    fn collect(&mut self) -> Result<(), GenError> {
        for &p in &self.v.params {
            let ty = self.param_type(p, self.v.rate(p))?;
            self.args.push(declarator(&ty, self.v.name(p)));
        }
        for &id in &self.v.schedule {
            self.collect_node(id)?;
        }
        Ok(())
    }

    fn collect_node(&mut self, id: NodeId) -> Result<(), GenError> {
        let node = self.node(id);
        let name = self.v.name(id);
        let rate = self.v.rate(id);
        let ty = node.ty.cpp();
        match &node.kind {
            NodeKind::Parameter { .. } => {
                let member_ty = self.param_type(id, rate)?;
                self.s.members.push(declarator(&member_ty, name));
                self.s.ctor.push(format!("this->{name} = {name};"));
                if rate != Rate::Constant {
                    self.s.refresh.push(format!("if ({name}->block_count < block_num) {{"));
                    self.s.refresh.push(format!("    {name}->run(block_num);"));
                    self.s.refresh.push("}".to_string());
                }
                if rate == Rate::Audio {
                    self.s
                        .block
                        .push(format!("sample *{name}_samps = {name}->get_outs();"));
                }
            }
            NodeKind::Variable(_) => {
                let value = self.code(node.deps[0], None);
                match rate {
                    Rate::Constant => {
                        self.s.members.push(format!("{ty} {name}"));
                        self.s.ctor.push(format!("{name} = {value};"));
                    }
                    Rate::Block => self.s.block.push(format!("{ty} {name} = {value};")),
                    Rate::Audio => self.s.audio.push(format!("{ty} {name} = {value};")),
                }
            }
            NodeKind::State => {
                let init = node.deps[0];
                self.check_init_scope(id, init)?;
                self.s.members.push(format!("{ty} {name}"));
                self.s.ctor.push(format!("{name} = {};", self.code(init, None)));
                let next = format!("{ty} {name}_next = {};", self.code(node.deps[1], None));
                let commit = format!("{name} = {name}_next;");
                if rate == Rate::Audio {
                    self.s.audio_next.push(next);
                    self.s.audio_commit.push(commit);
                } else {
                    self.s.block_next.push(next);
                    self.s.block_commit.push(commit);
                }
            }
            NodeKind::Upsample => {
                let source = self.code(node.deps[0], None);
                self.s.members.push(format!("sample {name}_arate"));
                self.s.ctor.push(format!("{name}_arate = 0;"));
                self.s.upsample_step.push(format!(
                    "sample {name}_step = ({source} - {name}_arate) / BL;"
                ));
                self.s
                    .upsample_update
                    .push(format!("{name}_arate += {name}_step;"));
            }
            NodeKind::Constant(_)
            | NodeKind::Unary(_)
            | NodeKind::Binary(_)
            | NodeKind::BinaryFn(_)
            | NodeKind::Subscript
            | NodeKind::Conditional => {}
        }
        Ok(())
    }

    /// The constructor may read parameters and members, but nothing that
    /// only exists inside run().
    fn check_init_scope(&self, state: NodeId, id: NodeId) -> Result<(), GenError> {
        let node = self.node(id);
        let rate = self.v.rate(id);
        let local = match node.kind {
            NodeKind::Variable(_) => rate != Rate::Constant,
            NodeKind::Upsample => true,
            NodeKind::State => false,
            _ => rate == Rate::Audio,
        };
        if local {
            return Err(GenError::StateInitRate {
                unit: self.v.unit.clone(),
                node: self.node(state).describe(),
                rate,
            });
        }
        if node.is_trivial() {
            return Ok(());
        }
        node.deps
            .iter()
            .try_for_each(|&dep| self.check_init_scope(state, dep))
    }

    fn setters(&self) -> Result<Vec<Setter>, GenError> {
        let mut setters = Vec::new();
        for &p in &self.v.params {
            let actions = self.node(p).actions();
            if actions.is_empty() {
                continue;
            }
            let param = self.v.name(p).to_string();
            let mut body = Vec::new();
            for action in actions {
                self.check_setter_scope(p, action.value)?;
                body.push(format!(
                    "{} = {};",
                    self.v.name(action.state),
                    self.code(action.value, Some(p))
                ));
            }
            let arg = declarator(&self.param_type(p, Rate::Constant)?, &param);
            setters.push(Setter { param, arg, body });
        }
        Ok(setters)
    }

    /// Setters run outside run(), so they may only read members.
    fn check_setter_scope(&self, param: NodeId, id: NodeId) -> Result<(), GenError> {
        let id = self.unadapted(id);
        let node = self.node(id);
        let local = match node.kind {
            NodeKind::Variable(_) => self.v.rate(id) != Rate::Constant,
            NodeKind::Parameter { .. } => id != param && self.v.rate(id) == Rate::Audio,
            _ => false,
        };
        if local {
            return Err(GenError::SetterScope {
                unit: self.v.unit.clone(),
                param: self.v.name(param).to_string(),
                node: node.describe(),
            });
        }
        if node.is_trivial() {
            return Ok(());
        }
        node.deps
            .iter()
            .try_for_each(|&dep| self.check_setter_scope(param, dep))
    }

    // ── Expressions ──

    /// Inline expression for `id`. Inside a setter, `shadow` names the
    /// parameter whose new value is the setter argument.
    fn code(&self, id: NodeId, shadow: Option<NodeId>) -> String {
        let id = if shadow.is_some() { self.unadapted(id) } else { id };
        let node = self.node(id);
        let name = self.v.name(id);
        let arg = |i: usize| self.code(node.deps[i], shadow);
        match &node.kind {
            NodeKind::Constant(lit) => lit.code(),
            NodeKind::Parameter { .. } if shadow == Some(id) => name.to_string(),
            NodeKind::Parameter { .. } => match self.v.rate(id) {
                Rate::Audio => format!("{name}_samps[i]"),
                Rate::Block => format!("{name}->get_out()"),
                Rate::Constant => name.to_string(),
            },
            NodeKind::Variable(_) | NodeKind::State => name.to_string(),
            NodeKind::Upsample => format!("{name}_arate"),
            NodeKind::Unary(op) if op == "-" => format!("(-{})", arg(0)),
            NodeKind::Unary(op) => format!("{op}({})", arg(0)),
            NodeKind::Binary(op) => format!("({} {} {})", arg(0), op.symbol(), arg(1)),
            NodeKind::BinaryFn(func) => format!("{func}({}, {})", arg(0), arg(1)),
            NodeKind::Subscript => format!("tblget({}, {})", arg(0), arg(1)),
            NodeKind::Conditional => format!("({} ? {} : {})", arg(0), arg(1), arg(2)),
        }
    }

    /// Setters read the value an adapter samples, not the adapter: its
    /// cached or interpolated copy still holds the old parameter value.
    fn unadapted(&self, id: NodeId) -> NodeId {
        match self.node(id).kind {
            NodeKind::Upsample | NodeKind::Variable(VarOrigin::CachedTemp) => self.node(id).deps[0],
            _ => id,
        }
    }

    /// Declared type of a parameter passed at `rate`.
    fn param_type(&self, id: NodeId, rate: Rate) -> Result<String, GenError> {
        let ty = &self.node(id).ty;
        match (ty, rate) {
            (ValueType::Sample | ValueType::Float, Rate::Constant) => Ok("sample".to_string()),
            (ty, Rate::Constant) => Ok(ty.cpp().to_string()),
            (ValueType::Sample | ValueType::Float | ValueType::Double, _) => {
                Ok("Ugen *".to_string())
            }
            (ty, rate) => Err(GenError::ParamRate {
                unit: self.v.unit.clone(),
                node: self.node(id).describe(),
                ty: ty.clone(),
                rate,
            }),
        }
    }

    // ── Writers ──

    fn base_class(&self) -> &'static str {
        match self.v.output_rate() {
            Rate::Audio => "Ugen_outa",
            _ => "Ugen_outb",
        }
    }

    fn write_declaration(&self, out: &mut String, setters: &[Setter]) {
        let class = &self.class;
        let args = self.args.join(", ");
        let _ = writeln!(out, "class {class} : public {} {{", self.base_class());
        for member in &self.s.members {
            let _ = writeln!(out, "    {member};");
        }
        let _ = writeln!(out, "  public:");
        let _ = writeln!(out, "    {class}({args});");
        let _ = writeln!(out, "    void run(long block_num);");
        for setter in setters {
            let _ = writeln!(out, "    void set_{}({});", setter.param, setter.arg);
        }
        let _ = writeln!(out, "}};\n");
        let _ = writeln!(out, "Ugen *{class}_create({args});\n");
    }

    fn write_implementation(&self, out: &mut String, setters: &[Setter]) {
        let class = &self.class;
        let args = self.args.join(", ");
        let s = &self.s;

        let _ = writeln!(out, "{class}::{class}({args})\n{{");
        write_lines(out, 1, ["block_count = 0;".to_string()].iter());
        write_lines(out, 1, s.ctor.iter());
        let _ = writeln!(out, "}}\n");

        let _ = writeln!(out, "void {class}::run(long block_num)\n{{");
        write_lines(out, 1, s.refresh.iter());
        write_lines(out, 1, ["block_count = block_num;".to_string()].iter());
        write_lines(out, 1, s.block.iter().chain(&s.block_next));
        let output = self.code(self.v.output, None);
        if self.v.output_rate() == Rate::Audio {
            write_lines(out, 1, s.upsample_step.iter());
            let _ = writeln!(out, "    for (int i = 0; i < BL; i++) {{");
            write_lines(out, 2, s.audio.iter());
            let _ = writeln!(out, "        outs[i] = {output};");
            write_lines(
                out,
                2,
                s.audio_next
                    .iter()
                    .chain(&s.upsample_update)
                    .chain(&s.audio_commit),
            );
            let _ = writeln!(out, "    }}");
        } else {
            let _ = writeln!(out, "    out = {output};");
        }
        write_lines(out, 1, s.block_commit.iter());
        let _ = writeln!(out, "}}\n");

        for setter in setters {
            let _ = writeln!(out, "void {class}::set_{}({})\n{{", setter.param, setter.arg);
            write_lines(out, 1, setter.body.iter());
            let _ = writeln!(out, "}}\n");
        }

        let names: Vec<&str> = self.v.params.iter().map(|&p| self.v.name(p)).collect();
        let _ = writeln!(out, "Ugen *{class}_create({args})\n{{");
        let _ = writeln!(out, "    return new {class}({});", names.join(", "));
        let _ = writeln!(out, "}}\n");
    }
}

// ── Free helpers ────────────────────────────────────────────────────────────

fn declarator(ty: &str, name: &str) -> String {
    if ty.ends_with('*') {
        format!("{ty}{name}")
    } else {
        format!("{ty} {name}")
    }
}

fn write_lines<'s>(out: &mut String, depth: usize, lines: impl Iterator<Item = &'s String>) {
    let indent = "    ".repeat(depth);
    for line in lines {
        let _ = writeln!(out, "{indent}{line}");
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{UnitBuilder, UnitDef};
    use crate::enumerate::RateCombination;
    use crate::rate::{Category, RateSet};
    use crate::rate_infer::infer_rates;
    use crate::rewrite::rewrite;
    use crate::schedule::schedule;

    fn variant(def: &UnitDef, params: Vec<Rate>, output: Rate) -> Variant {
        let order = schedule(&def.name, &def.graph, &def.roots()).unwrap();
        let param_rates = def.params.iter().copied().zip(params.iter().copied()).collect();
        let rates = infer_rates(&def.name, &def.graph, &order, &param_rates, output).unwrap();
        rewrite(def, &order, &rates, RateCombination { params, output }).unwrap()
    }

    fn rates(codes: &str) -> RateSet {
        RateSet::parse(codes).unwrap()
    }

    fn emit_one(v: &Variant) -> UnitArtifacts {
        emit_unit(&v.unit, std::slice::from_ref(v), &CodegenOptions::default()).unwrap()
    }

    fn smooth() -> UnitDef {
        let mut b = UnitBuilder::new("Smooth");
        let p = b.param("p", ValueType::Sample, rates("b")).unwrap();
        let s = b.state("s", 0, None).unwrap();
        let decayed = b.mul(s, 0.9).unwrap();
        let input = b.mul(p, 0.1).unwrap();
        let next = b.add(decayed, input).unwrap();
        b.next(s, next).unwrap();
        b.finish(s, Category::Generator(Rate::Block), false).unwrap()
    }

    fn decay() -> UnitDef {
        let mut b = UnitBuilder::new("Decay");
        let amp = b.param("amp", ValueType::Sample, rates("c")).unwrap();
        let time = b.param("time", ValueType::Sample, rates("c")).unwrap();
        let env = b.state("env", amp, None).unwrap();
        let ar = b.symbol("AR", ValueType::Sample).unwrap();
        let samples = b.mul(time, ar).unwrap();
        let clamped = b.call("fmax", vec![1.into(), samples.into()]).unwrap();
        let dursamples = b.var("dursamples", clamped, None).unwrap();
        let step = b.div(amp, dursamples).unwrap();
        let decay = b.var("decay", step, None).unwrap();
        let lowered = b.sub(env, decay).unwrap();
        let next = b.call("fmax", vec![lowered.into(), 0.into()]).unwrap();
        b.next(env, next).unwrap();
        b.use_output_rate(env).unwrap();
        b.on_write(amp, env, amp).unwrap();
        b.finish(env, Category::Generator(Rate::Audio), false).unwrap()
    }

    #[test]
    fn block_state_next_precedes_commit() {
        let v = variant(&smooth(), vec![Rate::Block], Rate::Block);
        let src = emit_one(&v).source;
        let next = src
            .find("sample s_next = ((s * 0.9) + (p->get_out() * 0.1));")
            .expect(&src);
        let out = src.find("    out = s;").expect(&src);
        let commit = src.find("    s = s_next;").expect(&src);
        assert!(next < out && out < commit, "{src}");
        assert!(!src.contains("for (int i"), "{src}");
    }

    #[test]
    fn block_parameter_is_refreshed() {
        let v = variant(&smooth(), vec![Rate::Block], Rate::Block);
        let src = emit_one(&v).source;
        assert!(src.contains(
            "    if (p->block_count < block_num) {\n        p->run(block_num);\n    }\n    block_count = block_num;\n"
        ));
    }

    #[test]
    fn header_declares_members_in_schedule_order() {
        let v = variant(&smooth(), vec![Rate::Block], Rate::Block);
        let header = emit_one(&v).header;
        assert!(header.contains(
            "class Smooth_b_b : public Ugen_outb {\n    Ugen *p;\n    sample s;\n  public:\n    Smooth_b_b(Ugen *p);\n"
        ), "{header}");
        assert!(header.contains("Ugen *Smooth_b_b_create(Ugen *p);"));
    }

    #[test]
    fn audio_state_loop_order() {
        let v = variant(&decay(), vec![Rate::Constant, Rate::Constant], Rate::Audio);
        let src = emit_one(&v).source;
        let body = &src[src.find("for (int i").expect(&src)..];
        let out = body.find("outs[i] = env;").unwrap();
        let next = body.find("sample env_next = fmax((env - decay), 0);").unwrap();
        let commit = body.find("env = env_next;").unwrap();
        assert!(out < next && next < commit, "{src}");
    }

    #[test]
    fn constant_variables_initialised_in_constructor() {
        let v = variant(&decay(), vec![Rate::Constant, Rate::Constant], Rate::Audio);
        let art = emit_one(&v);
        assert!(art.source.contains("    dursamples = fmax(1, (time * AR));\n"));
        assert!(art.source.contains("    decay = (amp / dursamples);\n"));
        assert!(art.source.contains("    env = amp;\n"));
        assert!(art.header.contains("    sample dursamples;\n"));
    }

    #[test]
    fn setter_overwrites_state() {
        let v = variant(&decay(), vec![Rate::Constant, Rate::Constant], Rate::Audio);
        let art = emit_one(&v);
        assert!(art.header.contains("    void set_amp(sample amp);\n"));
        assert!(art
            .source
            .contains("void Decay_cc_a::set_amp(sample amp)\n{\n    env = amp;\n}\n"));
    }

    #[test]
    fn upsample_step_and_increment() {
        let mut b = UnitBuilder::new("Phasor");
        let hz = b.param("hz", ValueType::Sample, rates("b")).unwrap();
        let phase = b.state("phase", 0, None).unwrap();
        let next = b.add(phase, hz).unwrap();
        b.next(phase, next).unwrap();
        b.use_output_rate(phase).unwrap();
        let def = b.finish(phase, Category::Generator(Rate::Audio), false).unwrap();
        let v = variant(&def, vec![Rate::Block], Rate::Audio);
        let src = emit_one(&v).source;
        let step = src
            .find("    sample hz_step = (hz->get_out() - hz_arate) / BL;\n")
            .expect(&src);
        let lp = src.find("for (int i = 0; i < BL; i++)").unwrap();
        let inc = src.find("        hz_arate += hz_step;\n").expect(&src);
        assert!(step < lp && lp < inc);
        assert!(src.contains("sample phase_next = (phase + hz_arate);"));
        assert!(src.contains("    hz_arate = 0;\n"));
    }

    #[test]
    fn audio_parameter_reads_sample_pointer() {
        let mut b = UnitBuilder::new("Mult");
        b.param("x1", ValueType::Sample, rates("ab")).unwrap();
        b.param("x2", ValueType::Sample, rates("abc")).unwrap();
        let out = b.mul("x1", "x2").unwrap();
        let def = b.finish(out, Category::Filter, true).unwrap();
        let v = variant(&def, vec![Rate::Audio, Rate::Constant], Rate::Audio);
        let src = emit_one(&v).source;
        assert!(src.contains("    sample *x1_samps = x1->get_outs();\n"));
        assert!(src.contains("        outs[i] = (x1_samps[i] * x2);\n"));
        assert!(src.contains("Mult_ac_a::Mult_ac_a(Ugen *x1, sample x2)"));
        assert!(src.contains("    return new Mult_ac_a(x1, x2);\n"));
    }

    #[test]
    fn table_type_cannot_be_block_rate() {
        let mut b = UnitBuilder::new("Lookup");
        let table = b
            .param("table", ValueType::Named("Table_ptr".into()), rates("b"))
            .unwrap();
        let out = b.subscript(table, 0).unwrap();
        let def = b.finish(out, Category::Filter, false).unwrap();
        let v = variant(&def, vec![Rate::Block], Rate::Block);
        let err = emit_unit("Lookup", &[v], &CodegenOptions::default()).unwrap_err();
        assert!(matches!(err, GenError::ParamRate { rate: Rate::Block, .. }));
    }

    fn follow(codes: &str) -> UnitDef {
        let mut b = UnitBuilder::new("Follow");
        let x = b.param("x", ValueType::Sample, rates(codes)).unwrap();
        let s = b.state("s", x, None).unwrap();
        let half = b.mul(s, 0.5).unwrap();
        let next = b.add(half, x).unwrap();
        b.next(s, next).unwrap();
        b.finish(s, Category::Filter, false).unwrap()
    }

    #[test]
    fn block_parameter_state_init_read_in_constructor() {
        let v = variant(&follow("b"), vec![Rate::Block], Rate::Block);
        let src = emit_one(&v).source;
        let ctor = &src[..src.find("void Follow_b_b::run").expect(&src)];
        assert!(ctor.contains("    this->x = x;
    s = x->get_out();
"), "{src}");
    }

    #[test]
    fn audio_state_init_rejected() {
        let v = variant(&follow("a"), vec![Rate::Audio], Rate::Audio);
        let err = emit_unit("Follow", &[v], &CodegenOptions::default()).unwrap_err();
        assert!(matches!(err, GenError::StateInitRate { rate: Rate::Audio, .. }));
    }

    #[test]
    fn block_variable_state_init_rejected() {
        let mut b = UnitBuilder::new("Late");
        let x = b.param("x", ValueType::Sample, rates("b")).unwrap();
        let doubled = b.mul(x, 2).unwrap();
        let start = b.var("start", doubled, None).unwrap();
        let s = b.state("s", start, None).unwrap();
        let next = b.add(s, x).unwrap();
        b.next(s, next).unwrap();
        let def = b.finish(s, Category::Filter, false).unwrap();
        let v = variant(&def, vec![Rate::Block], Rate::Block);
        let err = emit_unit("Late", &[v], &CodegenOptions::default()).unwrap_err();
        assert!(matches!(err, GenError::StateInitRate { rate: Rate::Block, .. }));
    }

    /// env = env * amp, reset from the same expression when amp is written.
    fn gated(no_interp: bool) -> UnitDef {
        let mut b = UnitBuilder::new("G");
        let amp = b.param("amp", ValueType::Sample, rates("b")).unwrap();
        if no_interp {
            b.no_interpolate(amp).unwrap();
        }
        let env = b.state("env", 0, None).unwrap();
        let scaled = b.mul(env, amp).unwrap();
        b.next(env, scaled).unwrap();
        b.use_output_rate(env).unwrap();
        b.on_write(amp, env, scaled).unwrap();
        b.finish(env, Category::Generator(Rate::Audio), false).unwrap()
    }

    #[test]
    fn setter_reads_argument_through_upsample() {
        let v = variant(&gated(false), vec![Rate::Block], Rate::Audio);
        let src = emit_one(&v).source;
        assert!(src.contains("sample env_next = (env * amp_arate);"), "{src}");
        assert!(
            src.contains("void G_b_a::set_amp(sample amp)\n{\n    env = (env * amp);\n}\n"),
            "{src}"
        );
    }

    #[test]
    fn setter_reads_argument_through_cached_temp() {
        let v = variant(&gated(true), vec![Rate::Block], Rate::Audio);
        let src = emit_one(&v).source;
        assert!(src.contains("    sample t1 = amp->get_out();\n"), "{src}");
        assert!(
            src.contains("void G_b_a::set_amp(sample amp)\n{\n    env = (env * amp);\n}\n"),
            "{src}"
        );
    }

    #[test]
    fn upsample_names_avoid_declared_names() {
        let mut b = UnitBuilder::new("H");
        let hz = b.param("hz", ValueType::Sample, rates("b")).unwrap();
        let doubled = b.mul(hz, 2).unwrap();
        let hz_step = b.var("hz_step", doubled, None).unwrap();
        let phase = b.state("phase", 0, None).unwrap();
        let sum = b.add(phase, hz).unwrap();
        let next = b.add(sum, hz_step).unwrap();
        b.next(phase, next).unwrap();
        b.use_output_rate(phase).unwrap();
        let def = b.finish(phase, Category::Generator(Rate::Audio), false).unwrap();
        let v = variant(&def, vec![Rate::Block], Rate::Audio);
        let src = emit_one(&v).source;
        assert_eq!(src.matches("sample hz_step = ").count(), 1, "{src}");
        assert!(src.contains("sample t1_step = (hz->get_out() - t1_arate) / BL;"), "{src}");
        assert!(src.contains("t1_arate += t1_step;"), "{src}");
        assert!(src.contains("hz_step_arate += hz_step_step;"), "{src}");
    }

    #[test]
    fn lookup_table_names_factories() {
        let v = variant(&smooth(), vec![Rate::Block], Rate::Block);
        let table = emit_one(&v).table;
        let entry = &table.variants["b"];
        assert_eq!(entry.constructor, "Smooth_b_b_create");
        assert_eq!(entry.output_rate, Rate::Block);
        let json = table.to_json().unwrap();
        assert!(json.contains("\"output_rate\": \"b\""), "{json}");
    }

    #[test]
    fn banner_records_source_hash() {
        let v = variant(&smooth(), vec![Rate::Block], Rate::Block);
        let options = CodegenOptions {
            source_hash: Some("abc123".into()),
        };
        let art = emit_unit("Smooth", &[v], &options).unwrap();
        assert!(art.header.starts_with("// smooth declarations\n// source sha256: abc123\n"));
        assert!(art.source.contains("#include \"smooth.h\"\n"));
        assert_eq!(art.file_stem, "smooth");
    }

    #[test]
    fn emission_is_deterministic() {
        let def = decay();
        let a = emit_one(&variant(&def, vec![Rate::Constant, Rate::Constant], Rate::Audio));
        let b = emit_one(&variant(&def, vec![Rate::Constant, Rate::Constant], Rate::Audio));
        assert_eq!(a.header, b.header);
        assert_eq!(a.source, b.source);
    }
}
