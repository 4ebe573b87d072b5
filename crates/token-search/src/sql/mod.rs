//! Boolean expression model and SQL rendering.

mod expression;
mod fragment;

pub use expression::{
    Column, ColumnTarget, Condition, ConditionOperator, ConditionValue, Expression, NoValueSets,
    OrderBy, ValueSetMembership, ValueSetResolver,
};
pub use fragment::{SqlFragment, SqlParam};
