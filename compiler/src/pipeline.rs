// pipeline.rs — Per-unit pass orchestration and the batch driver
//
// Runs the minimal set of passes for a terminal PassId over each lowered
// unit: enumerate the rate combinations, schedule the definition once, then
// infer rates and rewrite per combination, and finally emit the unit's
// files. Schedule and rewrite results are checked against their
// certificates; a failed certificate is a `GenError::Verification`.
//
// A failing unit yields one error diagnostic and no artifacts; the driver
// continues with the next unit.
//
// Preconditions: units were produced by `lower::lower`.
// Postconditions: `CompilationState.units` holds one entry per unit that
//                 compiled; `diagnostics` covers every other unit.
// Failure modes: per-unit `GenError`s, surfaced as diagnostics.
// Side effects: tracing events for pass timings and adapter creation.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::ast::{Program, Span};
use crate::builder::UnitDef;
use crate::codegen::{emit_unit, CodegenOptions, UnitArtifacts};
use crate::diag::{codes, Diagnostic};
use crate::enumerate::{rate_combinations, RateCombination};
use crate::error::GenError;
use crate::id::NodeId;
use crate::lower::LoweredUnit;
use crate::pass::{descriptor, required_passes, PassId, StageCert};
use crate::rate_infer::infer_rates;
use crate::rewrite::{rewrite, verify_rewrite, Variant};
use crate::schedule::{schedule, verify_schedule};

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible builds.
///
/// `source_hash`: SHA-256 of the raw `.ugg` source text.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub compiler_version: &'static str,
}

#[derive(Serialize)]
struct BuildInfo<'a> {
    source_hash: String,
    compiler_version: &'a str,
    manifest_schema_version: u32,
    /// Unit name → lookup keys of its variants.
    units: BTreeMap<&'a str, Vec<String>>,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        bytes_to_hex(&self.source_hash)
    }

    /// Serialize provenance and the compiled variant keys for `--emit build-info`.
    pub fn to_json(&self, units: &[CompiledUnit]) -> Result<String, serde_json::Error> {
        let info = BuildInfo {
            source_hash: self.source_hash_hex(),
            compiler_version: self.compiler_version,
            manifest_schema_version: 1,
            units: units
                .iter()
                .map(|u| (u.name.as_str(), u.combinations.iter().map(|c| c.key()).collect()))
                .collect(),
        };
        let mut json = serde_json::to_string_pretty(&info)?;
        json.push('\n');
        Ok(json)
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

pub fn compute_provenance(source: &str) -> Provenance {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    let result = hasher.finalize();
    let mut source_hash = [0u8; 32];
    source_hash.copy_from_slice(&result);

    Provenance {
        source_hash,
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Artifacts ──────────────────────────────────────────────────────────────

/// Everything produced for one unit, up to the requested terminal pass.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    pub name: String,
    pub span: Span,
    pub combinations: Vec<RateCombination>,
    /// Definition schedule over `UnitDef::roots`.
    pub order: Vec<NodeId>,
    pub variants: Vec<Variant>,
    pub artifacts: Option<UnitArtifacts>,
}

/// Pipeline execution failed for one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineError {
    /// The pass that produced the error.
    pub failing_pass: PassId,
    pub error: GenError,
}

/// Holds all compiled units and accumulated diagnostics.
pub struct CompilationState {
    pub program: Option<Program>,
    pub units: Vec<CompiledUnit>,
    pub diagnostics: Vec<Diagnostic>,
    pub has_error: bool,
    pub provenance: Option<Provenance>,
}

impl CompilationState {
    pub fn unit(&self, name: &str) -> Option<&CompiledUnit> {
        self.units.iter().find(|u| u.name == name)
    }
}

// ── Pass bookkeeping ───────────────────────────────────────────────────────

#[derive(Default)]
struct PassTimer {
    elapsed: HashMap<&'static str, Duration>,
}

impl PassTimer {
    fn time<T>(&mut self, pass: PassId, f: impl FnOnce() -> T) -> T {
        let t = Instant::now();
        let out = f();
        *self.elapsed.entry(descriptor(pass).name).or_default() += t.elapsed();
        out
    }

    fn report(&self, unit: &str, passes: &[PassId]) {
        for &pass in passes {
            let name = descriptor(pass).name;
            let elapsed = self.elapsed.get(name).copied().unwrap_or_default();
            debug!(
                unit,
                pass = name,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                "pass complete"
            );
        }
    }
}

fn fail(pass: PassId) -> impl FnOnce(GenError) -> PipelineError {
    move |error| PipelineError {
        failing_pass: pass,
        error,
    }
}

fn check(unit: &str, stage: &'static str, cert: &impl StageCert) -> Result<(), GenError> {
    if cert.all_pass() {
        Ok(())
    } else {
        Err(GenError::Verification {
            unit: unit.to_string(),
            stage,
            failed: cert.failures(),
        })
    }
}

// ── Per-variant and per-unit runners ───────────────────────────────────────

/// Infer rates and rewrite one combination over a scheduled definition.
pub fn compile_variant(
    def: &UnitDef,
    order: &[NodeId],
    combination: RateCombination,
) -> Result<Variant, PipelineError> {
    let param_rates = def
        .params
        .iter()
        .copied()
        .zip(combination.params.iter().copied())
        .collect();
    let rates = infer_rates(&def.name, &def.graph, order, &param_rates, combination.output)
        .map_err(fail(PassId::InferRates))?;
    let variant = rewrite(def, order, &rates, combination).map_err(fail(PassId::Rewrite))?;
    check(&def.name, "rewrite", &verify_rewrite(&variant)).map_err(fail(PassId::Rewrite))?;
    Ok(variant)
}

/// Run the minimal set of passes to produce `terminal` for one unit.
pub fn compile_unit(
    def: &UnitDef,
    span: Span,
    terminal: PassId,
    options: &CodegenOptions,
) -> Result<CompiledUnit, PipelineError> {
    let passes = required_passes(terminal);
    let mut timer = PassTimer::default();
    let mut unit = CompiledUnit {
        name: def.name.clone(),
        span,
        combinations: Vec::new(),
        order: Vec::new(),
        variants: Vec::new(),
        artifacts: None,
    };

    for &pass in &passes {
        match pass {
            PassId::Enumerate => {
                unit.combinations = timer.time(pass, || {
                    rate_combinations(&def.rate_sets, def.category, def.commutative)
                });
                debug!(
                    unit = %def.name,
                    combinations = ?unit.combinations.iter().map(|c| c.suffix()).collect::<Vec<_>>(),
                    "enumerated rate combinations"
                );
            }
            PassId::Schedule => {
                let roots = def.roots();
                unit.order = timer
                    .time(pass, || schedule(&def.name, &def.graph, &roots))
                    .map_err(fail(pass))?;
                check(&def.name, "schedule", &verify_schedule(&def.graph, &roots, &unit.order))
                    .map_err(fail(pass))?;
            }
            PassId::InferRates => {
                // Without a rewrite to follow, rates are only checked.
                if passes.contains(&PassId::Rewrite) {
                    continue;
                }
                for combo in &unit.combinations {
                    let param_rates = def
                        .params
                        .iter()
                        .copied()
                        .zip(combo.params.iter().copied())
                        .collect();
                    timer
                        .time(pass, || {
                            infer_rates(&def.name, &def.graph, &unit.order, &param_rates, combo.output)
                        })
                        .map_err(fail(pass))?;
                }
            }
            PassId::Rewrite => {
                for combo in &unit.combinations {
                    let variant = timer
                        .time(pass, || compile_variant(def, &unit.order, combo.clone()))?;
                    unit.variants.push(variant);
                }
            }
            PassId::Emit => {
                let artifacts = timer
                    .time(pass, || emit_unit(&def.name, &unit.variants, options))
                    .map_err(fail(pass))?;
                unit.artifacts = Some(artifacts);
            }
        }
    }

    timer.report(&def.name, &passes);
    Ok(unit)
}

// ── Batch driver ───────────────────────────────────────────────────────────

/// Compile every lowered unit, isolating failures per unit.
pub fn run_pipeline(
    units: &[LoweredUnit],
    terminal: PassId,
    options: &CodegenOptions,
) -> (Vec<CompiledUnit>, Vec<Diagnostic>) {
    let mut compiled = Vec::new();
    let mut diagnostics = Vec::new();
    for lowered in units {
        match compile_unit(&lowered.def, lowered.span, terminal, options) {
            Ok(unit) => {
                if unit.combinations.is_empty() {
                    diagnostics.push(
                        Diagnostic::warning(
                            lowered.span,
                            format!("unit '{}' has no variants", unit.name),
                        )
                        .with_code(codes::W0001)
                        .with_hint("no rate combination produces a non-constant output"),
                    );
                }
                compiled.push(unit);
            }
            Err(err) => {
                debug!(
                    unit = %lowered.def.name,
                    pass = descriptor(err.failing_pass).name,
                    "unit failed"
                );
                diagnostics.push(
                    Diagnostic::error(lowered.span, err.error.to_string())
                        .with_code(err.error.code()),
                );
            }
        }
    }
    (compiled, diagnostics)
}

/// Parse, lower and compile a source text up to `terminal`.
pub fn compile_source(source: &str, terminal: PassId, options: &CodegenOptions) -> CompilationState {
    let mut state = CompilationState {
        program: None,
        units: Vec::new(),
        diagnostics: Vec::new(),
        has_error: false,
        provenance: Some(compute_provenance(source)),
    };

    let parsed = crate::parser::parse(source);
    if !parsed.errors.is_empty() {
        state.diagnostics = parsed
            .errors
            .iter()
            .map(|e| Diagnostic::error(*e.span(), e.to_string()).with_code(codes::E0001))
            .collect();
        state.has_error = true;
        return state;
    }
    let Some(program) = parsed.program else {
        state.has_error = true;
        return state;
    };

    let lowered = crate::lower::lower(&program);
    state.diagnostics.extend(lowered.diagnostics);
    let (units, diagnostics) = run_pipeline(&lowered.units, terminal, options);
    state.diagnostics.extend(diagnostics);
    state.units = units;
    state.has_error = state.diagnostics.iter().any(Diagnostic::is_error);
    state.program = Some(program);
    state
}

// ── Tests ──────────────────────────────────────────────────────────────────
