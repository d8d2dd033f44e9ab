// /////////////////////////////////////////////////////////////////////////////
// casync
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Signal Handling
//!
//! Wires OS termination signals into a [`ShutdownCoordinator`](crate::shutdown::ShutdownCoordinator),
//! so a long-running `assemble` or `chunk` invocation gets the chance to stop
//! worker tasks and flush in-flight writes before the process exits.

use crate::shutdown::ShutdownCoordinator;

/// Spawns a task that waits for a termination signal and initiates graceful
/// shutdown on `coordinator` when one arrives.
///
/// On Unix this watches SIGTERM and SIGINT; on other platforms it falls back
/// to `tokio::signal::ctrl_c`. A second signal while shutdown is already in
/// progress is not handled specially here — the bootstrap's grace period
/// timeout (see [`ShutdownCoordinator::wait_for_shutdown`]) is the backstop
/// against a worker that never observes cancellation.
pub fn install_shutdown_handler(coordinator: ShutdownCoordinator) {
    tokio::spawn(async move {
        wait_for_termination_signal().await;
        tracing::info!("termination signal received, initiating graceful shutdown");
        coordinator.initiate_shutdown();
    });
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => tracing::debug!("received SIGTERM"),
        _ = sigint.recv() => tracing::debug!("received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::debug!("received Ctrl-C");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn install_shutdown_handler_cancels_token_on_manual_initiate() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(200));
        let token = coordinator.token();
        install_shutdown_handler(coordinator.clone());

        assert!(!token.is_cancelled());
        coordinator.initiate_shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(token.is_cancelled());
    }
}
