//! The formula compiler (C3).
//!
//! A perfmon or ARM component formula is a string like
//! `"(1 - ([CPU_CLK_UNHALTED.THREAD] / [TSC])) if [TSC] > 0 else 0"`. Before
//! it can be evaluated against a frame of observed counter values it must
//! be turned into a closed-form expression tree over a fixed set of
//! variable indices: aliases resolved, platform constants baked in,
//! conditionals rewritten to ternaries, and every remaining `[name]`
//! reference assigned a stable index.
//!
//! [`compile`] runs the rewrite-then-parse pipeline described in
//! SPEC_FULL.md §4.3 (steps a-k) and returns a [`CompiledExpr`] ready for
//! [`ast::eval`].

pub mod ast;
pub mod cpuid;
mod parser;
mod rewrite;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::metadata::{Granularity, Metadata};

pub use ast::{eval, Expr};

/// A formula that failed to compile.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    /// A Python-style conditional (`a if b else c`) had no matching `else`.
    #[error("conditional expression in {formula:?} has no matching else")]
    UnbalancedConditional {
        /// The formula string at the point the rewrite was attempted.
        formula: String,
    },
    /// A function call referenced a name that isn't `max`, `min`, or
    /// `strcmp_cpuid_str`.
    #[error("unknown intrinsic {name:?} in formula {formula:?}")]
    UnknownIntrinsic {
        /// The unrecognized function name.
        name: String,
        /// The formula string.
        formula: String,
    },
    /// The rewritten formula did not parse as a valid expression.
    #[error("could not parse formula {formula:?}: {detail}")]
    UnparseableExpression {
        /// The formula string at the point parsing failed.
        formula: String,
        /// Human-readable description of what went wrong.
        detail: String,
    },
}

/// Everything the compiler resolves from a catalog's `Events` and
/// `Constants` arrays, keyed by alias.
#[derive(Clone, Debug, Default)]
pub struct CompileContext {
    /// Alias (event `Alias` field or constant alias) -> canonical name.
    pub aliases: BTreeMap<String, String>,
    /// Full uncore catalog event name -> short `UniqueID`.
    pub uncore_unique_ids: BTreeMap<String, String>,
    /// The granularity platform constants are substituted for.
    pub granularity: Granularity,
}

/// A compiled formula: its final rewritten text (kept for diagnostics),
/// the expression tree, and the ordered list of variable names the tree's
/// [`Expr::Var`] indices refer to.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledExpr {
    /// The formula after every rewrite step, before tokenizing.
    pub rewritten: String,
    /// The parsed expression tree.
    pub ast: Expr,
    /// Variable names in first-occurrence order; an [`Expr::Var(i)`] refers
    /// to `variables[i]`.
    ///
    /// [`Expr::Var(i)`]: ast::Expr::Var
    pub variables: Vec<String>,
}

/// Run the full rewrite-then-parse compile pipeline on a raw catalog
/// formula string.
pub fn compile(
    formula: &str,
    ctx: &CompileContext,
    metadata: &Metadata,
) -> Result<CompiledExpr, CompileError> {
    let mut s = rewrite::substitute_aliases(formula, &ctx.aliases);
    s = rewrite::substitute_time_constants(&s);
    s = rewrite::translate_fixed_counters(&s);
    s = rewrite::substitute_platform_constants(&s, metadata, ctx.granularity);
    s = rewrite::rewrite_conditionals(&s)?;
    s = rewrite::repair_comparators(&s);
    s = rewrite::numeric_literal_placeholders(&s);
    s = rewrite::rename_ocr_events(&s);
    s = rewrite::abbreviate_uncore(&s, &ctx.uncore_unique_ids);

    let variables = rewrite::discover_variables(&s);
    let ast = parser::parse(&s, &variables)?;

    Ok(CompiledExpr {
        rewritten: s,
        ast,
        variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::synthetic_x86;

    #[test]
    fn compiles_a_conditional_formula_end_to_end() {
        let mut aliases = BTreeMap::new();
        aliases.insert("CYCLES".to_string(), "CPU_CLK_UNHALTED.THREAD".to_string());
        aliases.insert("STALL".to_string(), "STALLS".to_string());
        let ctx = CompileContext {
            aliases,
            uncore_unique_ids: BTreeMap::new(),
            granularity: Granularity::System,
        };
        let metadata = synthetic_x86();
        let compiled = compile("STALL if CYCLES > 0 else 0", &ctx, &metadata).unwrap();
        assert_eq!(compiled.rewritten, "[CPU_CLK_UNHALTED.THREAD] > 0 ? [STALLS] : 0");
        assert_eq!(
            compiled.variables,
            vec!["CPU_CLK_UNHALTED.THREAD".to_string(), "STALLS".to_string()]
        );

        let values = vec![1.0, 42.0];
        assert_eq!(eval(&compiled.ast, &values, None), 42.0);
        let zero_cycles = vec![0.0, 42.0];
        assert_eq!(eval(&compiled.ast, &zero_cycles, None), 0.0);
    }

    #[test]
    fn compiles_platform_constant_division() {
        let ctx = CompileContext {
            aliases: BTreeMap::new(),
            uncore_unique_ids: BTreeMap::new(),
            granularity: Granularity::System,
        };
        let metadata = synthetic_x86();
        let compiled = compile("[CPU_CLK_UNHALTED.THREAD] / [TSC]", &ctx, &metadata).unwrap();
        assert_eq!(compiled.variables, vec!["CPU_CLK_UNHALTED.THREAD".to_string()]);
        let values = vec![metadata.tsc() / 2.0];
        assert_eq!(eval(&compiled.ast, &values, None), 0.5);
    }

    #[test]
    fn unbalanced_conditional_is_reported() {
        let ctx = CompileContext::default();
        let metadata = synthetic_x86();
        let err = compile("A if B > 0", &ctx, &metadata).unwrap_err();
        assert!(matches!(err, CompileError::UnbalancedConditional { .. }));
    }
}
