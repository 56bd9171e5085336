//! Evaluation of multi-engine relation trees.
//!
//! A tree that crosses engines cannot be executed by any one engine. A
//! [`Processor`] walks it innermost-first: each maximal single-engine
//! subtree is conformed and executed by its own engine, transfers are
//! bridged through the host's [`transfer`](Processor::transfer) hook,
//! and materialization markers cache their payload on first evaluation.
//! Only the transfer hook is required; the host is the one that knows
//! how to ferry rows between its systems.

use tracing::debug;

use crate::engine::{Engine, EngineRef, Payload};
use crate::error::Result;
use crate::operation::{BinaryOperation, MarkerKind};
use crate::relation::{Relation, RelationView};
use crate::tag::ColumnTag;

pub trait Processor<T: ColumnTag> {
    /// Move an executed payload from the source relation's engine into
    /// `destination`, returning a payload the destination engine can
    /// hold as a leaf.
    ///
    /// `source` is the already-resolved subtree the payload came from;
    /// its columns and bounds describe the payload's shape.
    fn transfer(
        &self,
        source: &Relation<T>,
        destination: &EngineRef<T>,
        payload: Payload<T>,
    ) -> Result<Payload<T>>;

    /// Produce the cached payload for a materialization marker. The
    /// default conforms and executes the marked subtree on its engine.
    fn materialize(&self, relation: &Relation<T>, name: &str) -> Result<Payload<T>> {
        debug!(name, "materializing subtree");
        let engine = relation.engine().clone();
        let conformed = engine.conform(relation)?;
        engine.execute(&conformed)
    }

    /// Evaluate a relation tree to a payload.
    ///
    /// Transfers are bridged, materializations are cached (at most one
    /// effective execution each, even across concurrent processors
    /// sharing the tree), and the remaining single-engine tree is
    /// conformed and executed. Processing an already-evaluated tree
    /// returns the attached payload without touching any engine.
    fn process(&self, relation: &Relation<T>) -> Result<Payload<T>> {
        let resolved = self.resolve(relation)?;
        if let Some(payload) = resolved.payload() {
            return Ok(payload.clone());
        }
        let engine = resolved.engine().clone();
        let conformed = engine.conform(&resolved)?;
        engine.execute(&conformed)
    }

    /// Rewrite a tree so that no transfers and no payload-less
    /// materializations remain: transfers become destination-engine
    /// leaves holding imported payloads, and materializations get their
    /// payloads attached in place.
    fn resolve(&self, relation: &Relation<T>) -> Result<Relation<T>> {
        match relation.view() {
            RelationView::Leaf { .. } => Ok(relation.clone()),
            RelationView::Marker { kind, target } => match kind {
                MarkerKind::Materialization { name } => {
                    if relation.payload().is_some() {
                        debug!(name = %name, "materialization already evaluated");
                        return Ok(relation.clone());
                    }
                    let inner = self.resolve(target)?;
                    let payload = self.materialize(&inner, name)?;
                    // First writer wins; losers discard their payload.
                    relation.attach_payload(payload)?;
                    Ok(relation.clone())
                }
                MarkerKind::Transfer => {
                    let inner = self.resolve(target)?;
                    let source_engine = inner.engine().clone();
                    let payload = match inner.payload() {
                        Some(payload) => payload.clone(),
                        None => {
                            let conformed = source_engine.conform(&inner)?;
                            source_engine.execute(&conformed)?
                        }
                    };
                    let destination = relation.engine().clone();
                    debug!(
                        from = %source_engine,
                        to = %destination,
                        "bridging transfer"
                    );
                    let imported = self.transfer(&inner, &destination, payload)?;
                    Relation::leaf(
                        format!("transfer_to_{destination}"),
                        &destination,
                        relation.columns().iter().cloned(),
                        relation.is_unique(),
                        relation.min_rows(),
                        relation.max_rows(),
                        imported,
                    )
                }
                MarkerKind::Select => {
                    let inner = self.resolve(target)?;
                    if Relation::same(&inner, target) {
                        Ok(relation.clone())
                    } else {
                        Ok(Relation::select_marker(&inner, relation.columns().clone()))
                    }
                }
            },
            RelationView::Unary { operation, target } => {
                let inner = self.resolve(target)?;
                if Relation::same(&inner, target) {
                    Ok(relation.clone())
                } else {
                    inner.apply(operation.clone())
                }
            }
            RelationView::Binary {
                operation,
                lhs,
                rhs,
            } => {
                let left = self.resolve(lhs)?;
                let right = self.resolve(rhs)?;
                if Relation::same(&left, lhs) && Relation::same(&right, rhs) {
                    return Ok(relation.clone());
                }
                match operation {
                    BinaryOperation::Join { predicate, .. } => {
                        left.join(&right, predicate.clone())
                    }
                    BinaryOperation::Chain => left.chain(&right),
                }
            }
        }
    }
}
