//! Concurrent, index-preserving batch execution.
//!
//! Descriptors execute independently on scoped worker threads and may
//! complete out of order; completions are forwarded over a channel the
//! instant they land (streaming mode sends each one immediately) while the
//! returned collection is re-ordered by original index for buffered
//! framing. One call's failure never cancels a sibling call.

use std::sync::mpsc;
use std::thread;

use tracing::warn;

use spindle_core::{
    CallOutcome, ErrorInterceptor, ProcedureError, ProcedureKind, Router, execute_call,
    intercept_failure,
};

use crate::descriptor::CallDescriptor;

const BATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::batch");

/// Executes every descriptor concurrently, preserving index correlation.
///
/// `on_outcome` fires once per call in completion order, tagged with the
/// descriptor's original index; the returned vector is in index order and
/// always has exactly `calls.len()` entries.
pub fn execute_batch<C: Sync>(
    router: &Router<C>,
    ctx: &C,
    calls: &[CallDescriptor],
    chain: &[&dyn ErrorInterceptor<C>],
    mut on_outcome: impl FnMut(i32, &CallOutcome),
) -> Vec<CallOutcome> {
    let mut slots: Vec<Option<CallOutcome>> = Vec::new();
    slots.resize_with(calls.len(), || None);

    thread::scope(|scope| {
        let (completions, landed) = mpsc::channel::<(usize, i32, CallOutcome)>();
        for (slot, descriptor) in calls.iter().enumerate() {
            let completions = completions.clone();
            scope.spawn(move || {
                let outcome = run_one(router, ctx, descriptor, chain);
                // The receiver only disappears if the coordinator died; a
                // lost completion is then recorded as a lost worker below.
                let _ = completions.send((slot, descriptor.index, outcome));
            });
        }
        drop(completions);

        while let Ok((slot, index, outcome)) = landed.recv() {
            on_outcome(index, &outcome);
            if let Some(entry) = slots.get_mut(slot) {
                *entry = Some(outcome);
            }
        }
    });

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                warn!(target: BATCH_TARGET, "batch worker terminated without an outcome");
                CallOutcome::failure(
                    ProcedureError::internal("call terminated without an outcome").into_envelope(),
                )
            })
        })
        .collect()
}

/// Resolves and executes one descriptor inside its own containment
/// boundary.
fn run_one<C>(
    router: &Router<C>,
    ctx: &C,
    descriptor: &CallDescriptor,
    chain: &[&dyn ErrorInterceptor<C>],
) -> CallOutcome {
    let resolution = match router.lookup(&descriptor.path) {
        Some(procedure) if procedure.kind() == ProcedureKind::Subscription => {
            Err(ProcedureError::method_not_supported(
                "subscriptions require a bidirectional transport",
            ))
        }
        Some(procedure) if procedure.kind() == descriptor.kind => Ok(procedure),
        _ => Err(ProcedureError::no_procedure(
            descriptor.kind,
            &descriptor.path,
        )),
    };
    match resolution {
        Ok(procedure) => execute_call(
            procedure,
            ctx,
            &descriptor.path,
            descriptor.input.as_ref(),
            chain,
        ),
        Err(error) => {
            let final_error = intercept_failure(
                error,
                Some(ctx),
                &descriptor.path,
                descriptor.input.as_ref(),
                Some(descriptor.kind),
                chain,
            );
            CallOutcome::failure(final_error.into_envelope())
        }
    }
}
