//! Condition evaluator (C3, §4.4 of spec.md).
//!
//! Deliberately narrow: two operators, no parser, no expression language.
//! Unlike the teacher's `WorkflowEvaluator` (`boternity-core/src/workflow/
//! expression.rs`), which wraps a full `jexl_eval::Evaluator` with
//! registered string/boolean transforms, this evaluator only ever compares
//! one context value against one literal. That is the whole operator set
//! §1 permits -- a general DSL is an explicit Non-goal.

use flowrunner_schemas::value::ValueMap;
use flowrunner_schemas::workflow::{ConditionOperator, ConditionSpec};
use serde_json::Value;

/// Evaluate a single named condition against a step's input context.
///
/// Absent context keys evaluate to `false` for `equals` and `true` for
/// `not_equals`, per §4.4.
pub fn evaluate(spec: &ConditionSpec, context: &ValueMap) -> bool {
    let actual = context.get(&spec.expression);
    match spec.operator {
        ConditionOperator::Equals => actual == Some(&spec.value),
        ConditionOperator::NotEquals => actual != Some(&spec.value),
    }
}

/// Evaluate every condition in a condition step, producing the
/// `{condition_0: bool, condition_1: bool, ...}` result map (§4.4).
pub fn evaluate_all(conditions: &[ConditionSpec], context: &ValueMap) -> ValueMap {
    let mut result = ValueMap::new();
    for (index, spec) in conditions.iter().enumerate() {
        result.insert(format!("condition_{index}"), Value::Bool(evaluate(spec, context)));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(expr: &str, op: ConditionOperator, value: Value) -> ConditionSpec {
        ConditionSpec {
            name: expr.to_string(),
            expression: expr.to_string(),
            operator: op,
            value,
        }
    }

    #[test]
    fn equals_true_when_values_match() {
        let mut ctx = ValueMap::new();
        ctx.insert("x".to_string(), Value::from(1));
        let spec = spec("x", ConditionOperator::Equals, Value::from(1));
        assert!(evaluate(&spec, &ctx));
    }

    #[test]
    fn equals_false_when_key_absent() {
        let ctx = ValueMap::new();
        let spec = spec("x", ConditionOperator::Equals, Value::from(1));
        assert!(!evaluate(&spec, &ctx));
    }

    #[test]
    fn not_equals_true_when_key_absent() {
        let ctx = ValueMap::new();
        let spec = spec("x", ConditionOperator::NotEquals, Value::from(1));
        assert!(evaluate(&spec, &ctx));
    }

    #[test]
    fn evaluate_all_indexes_results_in_declaration_order() {
        let mut ctx = ValueMap::new();
        ctx.insert("x".to_string(), Value::from(1));
        let conditions = vec![
            spec("x", ConditionOperator::Equals, Value::from(1)),
            spec("x", ConditionOperator::Equals, Value::from(2)),
        ];
        let result = evaluate_all(&conditions, &ctx);
        assert_eq!(result.get("condition_0"), Some(&Value::Bool(true)));
        assert_eq!(result.get("condition_1"), Some(&Value::Bool(false)));
    }
}
