// error.rs — Errors raised while building or compiling a unit
//
// Every error is fatal for the unit it names: no output is written for that
// unit, and the driver moves on to the next one. Messages name the unit and,
// where one exists, the offending node.

use thiserror::Error;

use crate::diag::{codes, DiagCode};
use crate::node::ValueType;
use crate::rate::Rate;

/// Broad class of a `GenError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Structural,
    TypeMismatch,
    Lookup,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenError {
    /// A reachable State has no recurrence expression.
    #[error("unit '{unit}': incomplete state definition: {node} has no recurrence")]
    IncompleteState { unit: String, node: String },

    #[error("unit '{unit}': cannot use {what} as a node")]
    Uncoercible { unit: String, what: String },

    #[error("unit '{unit}': function '{function}' takes {expected} argument(s), got {found}")]
    Arity {
        unit: String,
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("unit '{unit}': {node} is not a state register")]
    NotAState { unit: String, node: String },

    #[error("unit '{unit}': {node} is not a parameter")]
    NotAParameter { unit: String, node: String },

    #[error("unit '{unit}': recurrence of {node} is already defined")]
    RecurrenceRedefined { unit: String, node: String },

    #[error("unit '{unit}': name '{name}' is already declared")]
    DuplicateName { unit: String, name: String },

    #[error("unit '{unit}': parameter '{param}' admits no rates")]
    EmptyRateSet { unit: String, param: String },

    #[error("unit '{unit}': commutative units take exactly 2 parameters, found {found}")]
    Commutativity { unit: String, found: usize },

    #[error("unit '{unit}': {node} of type {ty} cannot be passed at {rate} rate")]
    ParamRate {
        unit: String,
        node: String,
        ty: ValueType,
        rate: Rate,
    },

    #[error("unit '{unit}': initial value of {node} reads a {rate}-rate value that only exists inside run()")]
    StateInitRate {
        unit: String,
        node: String,
        rate: Rate,
    },

    #[error("unit '{unit}': setter for '{param}' reads {node}, which only exists inside run()")]
    SetterScope {
        unit: String,
        param: String,
        node: String,
    },

    #[error("unit '{unit}': {node} needs {required} rate but the variant produces {target} rate")]
    RateConflict {
        unit: String,
        node: String,
        required: Rate,
        target: Rate,
    },

    #[error("unit '{unit}': {node} has mismatched branch types {then_ty} and {else_ty}")]
    TypeMismatch {
        unit: String,
        node: String,
        then_ty: ValueType,
        else_ty: ValueType,
    },

    #[error("unit '{unit}': undeclared name '{name}'")]
    UnknownName { unit: String, name: String },

    #[error("unit '{unit}': unknown function '{name}'")]
    UnknownFunction { unit: String, name: String },

    /// A pass postcondition failed; indicates a compiler bug.
    #[error("unit '{unit}': {stage} verification failed: {failed}")]
    Verification {
        unit: String,
        stage: &'static str,
        failed: String,
    },
}

impl GenError {
    pub fn unit(&self) -> &str {
        match self {
            GenError::IncompleteState { unit, .. }
            | GenError::Uncoercible { unit, .. }
            | GenError::Arity { unit, .. }
            | GenError::NotAState { unit, .. }
            | GenError::NotAParameter { unit, .. }
            | GenError::RecurrenceRedefined { unit, .. }
            | GenError::DuplicateName { unit, .. }
            | GenError::EmptyRateSet { unit, .. }
            | GenError::Commutativity { unit, .. }
            | GenError::ParamRate { unit, .. }
            | GenError::StateInitRate { unit, .. }
            | GenError::SetterScope { unit, .. }
            | GenError::RateConflict { unit, .. }
            | GenError::TypeMismatch { unit, .. }
            | GenError::UnknownName { unit, .. }
            | GenError::UnknownFunction { unit, .. }
            | GenError::Verification { unit, .. } => unit,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GenError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            GenError::UnknownName { .. } | GenError::UnknownFunction { .. } => ErrorKind::Lookup,
            _ => ErrorKind::Structural,
        }
    }

    /// Stable diagnostic code for frontend reporting.
    pub fn code(&self) -> DiagCode {
        match self {
            GenError::UnknownName { .. } => codes::E0100,
            GenError::DuplicateName { .. } => codes::E0101,
            GenError::UnknownFunction { .. } => codes::E0102,
            GenError::Arity { .. } => codes::E0103,
            GenError::Uncoercible { .. } => codes::E0104,
            GenError::TypeMismatch { .. } => codes::E0200,
            GenError::IncompleteState { .. } => codes::E0300,
            GenError::NotAState { .. } => codes::E0301,
            GenError::NotAParameter { .. } => codes::E0302,
            GenError::RecurrenceRedefined { .. } => codes::E0303,
            GenError::EmptyRateSet { .. } => codes::E0305,
            GenError::Commutativity { .. } => codes::E0306,
            GenError::RateConflict { .. } => codes::E0400,
            GenError::ParamRate { .. } => codes::E0401,
            GenError::StateInitRate { .. } => codes::E0402,
            GenError::SetterScope { .. } => codes::E0403,
            GenError::Verification { .. } => codes::E0600,
        }
    }
}
