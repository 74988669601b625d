// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Demand-port auxiliary thread (§4.8), abstracted behind a trait so a
//! platform-specific mach-port source can be dropped in later without
//! touching the event loop.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// A notification source whose members are opaque "ports": when armed, it
/// reports that *some* port became active without consuming the
/// underlying message, mirroring a mach port-set `mach_msg` receive that
/// fails with "too large."
#[async_trait]
pub trait DemandPortSource: Send + Sync {
    /// Start the auxiliary thread, forwarding active port tags on `tx`.
    /// Returns immediately; the thread runs until `tx` is dropped.
    fn spawn(self: Box<Self>, tx: mpsc::Sender<u32>);
}

/// The only concrete source in this build: the real mach-port facility is
/// platform-specific and out of scope (§1), so this source never fires.
/// The trait boundary exists so the pipe bridge and event-loop wiring are
/// fully exercised.
pub struct NullDemandPortSource;

#[async_trait]
impl DemandPortSource for NullDemandPortSource {
    fn spawn(self: Box<Self>, tx: mpsc::Sender<u32>) {
        // Nothing to forward; dropping `_tx` immediately would close the
        // channel and spuriously wake the main loop's `select!` arm
        // forever, so it's held for the process lifetime by leaking the
        // sender into a detached task that just awaits cancellation.
        tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_source_never_sends() {
        let (tx, mut rx) = mpsc::channel(1);
        Box::new(NullDemandPortSource).spawn(tx);
        let result = tokio::time::timeout(std::time::Duration::from_millis(20), rx.recv()).await;
        assert!(result.is_err(), "null source must never fire");
    }
}
