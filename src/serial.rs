//! Serialization of relation trees.
//!
//! Relations carry live engine handles and payload slots, neither of
//! which can travel. [`RelationTree`] is the serde-facing mirror: an
//! owned tagged tree with one variant per relation kind, engines
//! referenced by name, payloads omitted. Resolution turns a tree back
//! into a validated relation through a host [`Resolver`], which supplies
//! the engine handles and the leaf payloads; every factory rule is
//! re-checked on the way in, so a tampered tree fails exactly like a
//! bad build would.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::engine::{Engine, EngineRef, Payload};
use crate::error::{RelationError, Result};
use crate::expr::{ColumnExpression, Predicate, SortTerm};
use crate::operation::{BinaryOperation, MarkerKind, UnaryOperation};
use crate::relation::{Relation, RelationView};
use crate::tag::ColumnTag;

/// A serializable mirror of a relation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RelationTree<T: ColumnTag> {
    Leaf {
        name: String,
        engine: String,
        columns: Vec<T>,
        unique: bool,
        min_rows: usize,
        max_rows: Option<usize>,
    },
    Unary {
        operation: OperationTree<T>,
        target: Box<RelationTree<T>>,
    },
    Join {
        predicate: Predicate<T>,
        lhs: Box<RelationTree<T>>,
        rhs: Box<RelationTree<T>>,
    },
    Chain {
        lhs: Box<RelationTree<T>>,
        rhs: Box<RelationTree<T>>,
    },
    Materialization {
        name: String,
        target: Box<RelationTree<T>>,
    },
    Transfer {
        destination: String,
        target: Box<RelationTree<T>>,
    },
    Select {
        columns: Vec<T>,
        target: Box<RelationTree<T>>,
    },
}

/// A serializable mirror of a unary operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationTree<T: ColumnTag> {
    Calculation {
        tag: T,
        expression: ColumnExpression<T>,
    },
    Deduplication,
    Projection {
        columns: Vec<T>,
    },
    Selection {
        predicate: Predicate<T>,
    },
    Slice {
        start: usize,
        stop: Option<usize>,
    },
    Sort {
        terms: Vec<SortTerm<T>>,
    },
}

/// Supplies the live pieces a serialized tree cannot carry.
pub trait Resolver<T: ColumnTag> {
    /// The engine registered under `name`.
    fn engine(&self, name: &str) -> Result<EngineRef<T>>;

    /// The payload for a leaf being reconstructed.
    fn leaf_payload(
        &self,
        engine: &EngineRef<T>,
        name: &str,
        columns: &BTreeSet<T>,
    ) -> Result<Payload<T>>;
}

/// A name-to-engine map usable as the engine side of a [`Resolver`].
#[derive(Default)]
pub struct EngineRegistry<T: ColumnTag> {
    engines: HashMap<String, EngineRef<T>>,
}

impl<T: ColumnTag> EngineRegistry<T> {
    pub fn new() -> Self {
        EngineRegistry {
            engines: HashMap::new(),
        }
    }

    /// Register an engine under its own name. Duplicate names are
    /// rejected: resolution must be unambiguous.
    pub fn register(&mut self, engine: EngineRef<T>) -> Result<()> {
        let name = engine.name().to_string();
        if self.engines.contains_key(&name) {
            return Err(RelationError::invariant(format!(
                "an engine named {name} is already registered"
            )));
        }
        self.engines.insert(name, engine);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<EngineRef<T>> {
        self.engines.get(name).cloned().ok_or_else(|| {
            RelationError::engine(format!("no engine named {name} is registered"))
        })
    }
}

impl<T: ColumnTag> Relation<T> {
    /// Mirror this relation as a serializable tree.
    ///
    /// Payloads are dropped (a resolver re-supplies leaf payloads;
    /// materializations come back cold) and custom operations do not
    /// serialize.
    pub fn to_tree(&self) -> Result<RelationTree<T>> {
        match self.view() {
            RelationView::Leaf { name } => Ok(RelationTree::Leaf {
                name: name.to_string(),
                engine: self.engine().name().to_string(),
                columns: self.columns().iter().cloned().collect(),
                unique: self.is_unique(),
                min_rows: self.min_rows(),
                max_rows: self.max_rows(),
            }),
            RelationView::Unary { operation, target } => {
                let operation = match operation {
                    UnaryOperation::Calculation { tag, expression } => OperationTree::Calculation {
                        tag: tag.clone(),
                        expression: expression.clone(),
                    },
                    UnaryOperation::Deduplication => OperationTree::Deduplication,
                    UnaryOperation::Projection { columns } => OperationTree::Projection {
                        columns: columns.iter().cloned().collect(),
                    },
                    UnaryOperation::Selection { predicate } => OperationTree::Selection {
                        predicate: predicate.clone(),
                    },
                    UnaryOperation::Slice { start, stop } => OperationTree::Slice {
                        start: *start,
                        stop: *stop,
                    },
                    UnaryOperation::Sort { terms } => OperationTree::Sort {
                        terms: terms.clone(),
                    },
                    UnaryOperation::Identity => {
                        return target.to_tree();
                    }
                    UnaryOperation::Custom(op) => {
                        return Err(RelationError::invariant(format!(
                            "custom operation {} does not serialize",
                            op.name()
                        )));
                    }
                };
                Ok(RelationTree::Unary {
                    operation,
                    target: Box::new(target.to_tree()?),
                })
            }
            RelationView::Binary {
                operation,
                lhs,
                rhs,
            } => match operation {
                BinaryOperation::Join { predicate, .. } => Ok(RelationTree::Join {
                    predicate: predicate.clone(),
                    lhs: Box::new(lhs.to_tree()?),
                    rhs: Box::new(rhs.to_tree()?),
                }),
                BinaryOperation::Chain => Ok(RelationTree::Chain {
                    lhs: Box::new(lhs.to_tree()?),
                    rhs: Box::new(rhs.to_tree()?),
                }),
            },
            RelationView::Marker { kind, target } => match kind {
                MarkerKind::Materialization { name } => Ok(RelationTree::Materialization {
                    name: name.clone(),
                    target: Box::new(target.to_tree()?),
                }),
                MarkerKind::Transfer => Ok(RelationTree::Transfer {
                    destination: self.engine().name().to_string(),
                    target: Box::new(target.to_tree()?),
                }),
                MarkerKind::Select => Ok(RelationTree::Select {
                    columns: self.columns().iter().cloned().collect(),
                    target: Box::new(target.to_tree()?),
                }),
            },
        }
    }
}

impl<T: ColumnTag> RelationTree<T> {
    /// Rebuild a validated relation from this tree.
    pub fn resolve(&self, resolver: &impl Resolver<T>) -> Result<Relation<T>> {
        match self {
            RelationTree::Leaf {
                name,
                engine,
                columns,
                unique,
                min_rows,
                max_rows,
            } => {
                let engine = resolver.engine(engine)?;
                let columns: BTreeSet<T> = columns.iter().cloned().collect();
                let payload = resolver.leaf_payload(&engine, name, &columns)?;
                Relation::leaf(
                    name.clone(),
                    &engine,
                    columns,
                    *unique,
                    *min_rows,
                    *max_rows,
                    payload,
                )
            }
            RelationTree::Unary { operation, target } => {
                let target = target.resolve(resolver)?;
                let operation = match operation {
                    OperationTree::Calculation { tag, expression } => {
                        UnaryOperation::Calculation {
                            tag: tag.clone(),
                            expression: expression.clone(),
                        }
                    }
                    OperationTree::Deduplication => UnaryOperation::Deduplication,
                    OperationTree::Projection { columns } => UnaryOperation::Projection {
                        columns: columns.iter().cloned().collect(),
                    },
                    OperationTree::Selection { predicate } => UnaryOperation::Selection {
                        predicate: predicate.clone(),
                    },
                    OperationTree::Slice { start, stop } => UnaryOperation::Slice {
                        start: *start,
                        stop: *stop,
                    },
                    OperationTree::Sort { terms } => UnaryOperation::Sort {
                        terms: terms.clone(),
                    },
                };
                target.apply(operation)
            }
            RelationTree::Join {
                predicate,
                lhs,
                rhs,
            } => {
                let lhs = lhs.resolve(resolver)?;
                let rhs = rhs.resolve(resolver)?;
                lhs.join(&rhs, predicate.clone())
            }
            RelationTree::Chain { lhs, rhs } => {
                let lhs = lhs.resolve(resolver)?;
                let rhs = rhs.resolve(resolver)?;
                lhs.chain(&rhs)
            }
            RelationTree::Materialization { name, target } => {
                target.resolve(resolver)?.materialized(name.clone())
            }
            RelationTree::Transfer {
                destination,
                target,
            } => {
                let destination = resolver.engine(destination)?;
                target.resolve(resolver)?.transferred_to(&destination)
            }
            RelationTree::Select { columns, target } => {
                let target = target.resolve(resolver)?;
                let columns: BTreeSet<T> = columns.iter().cloned().collect();
                if !columns.is_subset(target.columns()) {
                    return Err(RelationError::invariant(
                        "a select marker cannot introduce columns its target lacks",
                    ));
                }
                Ok(Relation::select_marker(&target, columns))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Datum;
    use crate::iteration::rows::{Row, RowIterable};
    use crate::iteration::IterationEngine;
    use crate::tag::StringTag;

    struct TestResolver {
        registry: EngineRegistry<StringTag>,
    }

    impl Resolver<StringTag> for TestResolver {
        fn engine(&self, name: &str) -> Result<EngineRef<StringTag>> {
            self.registry.get(name)
        }

        fn leaf_payload(
            &self,
            _engine: &EngineRef<StringTag>,
            _name: &str,
            _columns: &BTreeSet<StringTag>,
        ) -> Result<Payload<StringTag>> {
            Ok(Payload::Rows(RowIterable::sequence(vec![
                row(1),
                row(2),
                row(3),
            ])))
        }
    }

    fn tag(name: &str) -> StringTag {
        StringTag::from(name)
    }

    fn row(a: i64) -> Row<StringTag> {
        [(tag("a"), Datum::Int(a))].into_iter().collect()
    }

    fn resolver_and_relation() -> (TestResolver, Relation<StringTag>) {
        let engine: EngineRef<StringTag> = EngineRef::new(IterationEngine::new("iter"));
        let mut registry = EngineRegistry::new();
        registry.register(engine.clone()).unwrap();
        let leaf = IterationEngine::make_leaf(
            &engine,
            "t",
            [tag("a")],
            RowIterable::sequence(vec![row(1), row(2), row(3)]),
        )
        .unwrap();
        let relation = leaf
            .filtered(Predicate::function(
                "lt",
                vec![
                    ColumnExpression::reference("a"),
                    ColumnExpression::literal(3i64),
                ],
            ))
            .unwrap()
            .distinct()
            .unwrap();
        (TestResolver { registry }, relation)
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let (resolver, relation) = resolver_and_relation();
        let tree = relation.to_tree().unwrap();
        let rebuilt = tree.resolve(&resolver).unwrap();
        assert_eq!(rebuilt, relation);
    }

    #[test]
    fn test_tree_serializes_as_tagged_json() {
        let (_, relation) = resolver_and_relation();
        let tree = relation.to_tree().unwrap();
        let json = serde_json::to_value(&tree).unwrap();
        // The tagged-tree shape: one variant tag per node.
        assert!(json.get("Unary").is_some());
        let text = serde_json::to_string(&tree).unwrap();
        let parsed: RelationTree<StringTag> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, tree);
    }

    #[test]
    fn test_duplicate_engine_names_rejected() {
        let mut registry: EngineRegistry<StringTag> = EngineRegistry::new();
        registry
            .register(EngineRef::new(IterationEngine::new("iter")))
            .unwrap();
        let err = registry
            .register(EngineRef::new(IterationEngine::new("iter")))
            .unwrap_err();
        assert!(matches!(err, RelationError::Invariant(_)));
    }

    #[test]
    fn test_unknown_engine_fails_resolution() {
        let (resolver, relation) = resolver_and_relation();
        let tree = relation.to_tree().unwrap();
        let json = serde_json::to_string(&tree).unwrap();
        let renamed = json.replace("\"iter\"", "\"missing\"");
        let parsed: RelationTree<StringTag> = serde_json::from_str(&renamed).unwrap();
        let err = parsed.resolve(&resolver).unwrap_err();
        assert!(matches!(err, RelationError::Engine(_)));
    }
}
