// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::env::Identity;
use svpr_core::JobConfig;
use svpr_wire::JobSubmission;

fn test_engine() -> Engine {
    let (events, _rx) = tokio::sync::mpsc::channel(16);
    Engine::new(Identity::PerUser { uid: 501 }, events)
}

#[test]
fn submit_then_get_job_round_trips_modulo_handles() {
    let mut engine = test_engine();
    let cfg = JobConfig {
        label: "echo".into(),
        program_arguments: vec!["/bin/echo".into(), "hi".into()],
        on_demand: true,
        ..Default::default()
    };
    let reply = dispatch(&mut engine, 1, None, Request::SubmitJob { job: JobSubmission::Single(cfg) });
    assert!(matches!(reply, Response::Submitted { result: SubmitResult::Single(None) }));

    let reply = dispatch(&mut engine, 1, None, Request::GetJob { label: "echo".into() });
    match reply {
        Response::Job { config } => assert_eq!(config.label, "echo"),
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[test]
fn duplicate_submit_via_array_reports_parallel_codes() {
    let mut engine = test_engine();
    let cfg = |label: &str| JobConfig { label: label.into(), program_arguments: vec!["/bin/true".into()], on_demand: true, ..Default::default() };
    dispatch(&mut engine, 1, None, Request::SubmitJob { job: JobSubmission::Single(cfg("a")) });

    let reply = dispatch(
        &mut engine,
        1,
        None,
        Request::SubmitJob { job: JobSubmission::Many(vec![cfg("a"), cfg("b")]) },
    );
    match reply {
        Response::Submitted { result: SubmitResult::Many(codes) } => {
            assert_eq!(codes.len(), 2);
            assert_eq!(codes[0], Some(ReplyError::AlreadyExists));
            assert_eq!(codes[1], None);
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[test]
fn get_job_for_unknown_label_is_esrch() {
    let mut engine = test_engine();
    let reply = dispatch(&mut engine, 1, None, Request::GetJob { label: "nope".into() });
    assert!(matches!(reply, Response::Error { error: ReplyError::NoSuchJob }));
}

#[test]
fn umask_round_trips() {
    let mut engine = test_engine();
    let previous = match dispatch(&mut engine, 1, None, Request::SetUmask { mask: 0o077 }) {
        Response::UmaskValue { previous } => previous,
        other => panic!("unexpected reply: {other:?}"),
    };
    assert_eq!(previous, 0o022);
    match dispatch(&mut engine, 1, None, Request::GetUmask) {
        Response::UmaskValue { previous } => assert_eq!(previous, 0o077),
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[test]
fn check_in_without_binding_is_not_permitted() {
    let mut engine = test_engine();
    let reply = dispatch(&mut engine, 1, None, Request::CheckIn);
    assert!(matches!(reply, Response::Error { error: ReplyError::NotPermitted }));
}

#[test]
fn batch_query_defaults_to_enabled() {
    let mut engine = test_engine();
    let reply = dispatch(&mut engine, 1, None, Request::BatchQuery);
    assert!(matches!(reply, Response::Bool { value: true }));
}

#[test]
fn batch_control_disable_then_enable_round_trips_query() {
    let mut engine = test_engine();
    dispatch(&mut engine, 1, None, Request::BatchControl { enabled: false });
    assert!(matches!(dispatch(&mut engine, 2, None, Request::BatchQuery), Response::Bool { value: false }));

    dispatch(&mut engine, 1, None, Request::BatchControl { enabled: true });
    assert!(matches!(dispatch(&mut engine, 2, None, Request::BatchQuery), Response::Bool { value: true }));
}

#[test]
fn batch_stays_disabled_until_every_disabler_re_enables() {
    let mut engine = test_engine();
    dispatch(&mut engine, 1, None, Request::BatchControl { enabled: false });
    dispatch(&mut engine, 2, None, Request::BatchControl { enabled: false });
    dispatch(&mut engine, 1, None, Request::BatchControl { enabled: true });
    assert!(matches!(dispatch(&mut engine, 1, None, Request::BatchQuery), Response::Bool { value: false }));

    dispatch(&mut engine, 2, None, Request::BatchControl { enabled: true });
    assert!(matches!(dispatch(&mut engine, 1, None, Request::BatchQuery), Response::Bool { value: true }));
}

#[test]
fn batch_control_toggle_without_a_batch_helper_job_is_a_harmless_no_op() {
    let mut engine = test_engine();
    // No job was ever submitted with `batch_helper: true`, so the signaling
    // side effect has nothing to send to and must not panic.
    dispatch(&mut engine, 1, None, Request::BatchControl { enabled: false });
    dispatch(&mut engine, 1, None, Request::BatchControl { enabled: true });
}

#[test]
fn submitting_a_batch_helper_job_records_its_label() {
    let mut engine = test_engine();
    let cfg = JobConfig {
        label: "batch-helper".into(),
        program_arguments: vec!["/bin/true".into()],
        on_demand: true,
        batch_helper: true,
        ..Default::default()
    };
    dispatch(&mut engine, 1, None, Request::SubmitJob { job: JobSubmission::Single(cfg) });
    assert_eq!(engine.batch_helper_label.as_deref(), Some("batch-helper"));
}

#[test]
fn get_resource_limits_reports_every_recognized_kind() {
    let mut engine = test_engine();
    match dispatch(&mut engine, 1, None, Request::GetResourceLimits) {
        Response::ResourceLimits { limits } => {
            for kind in svpr_core::LimitKind::ALL {
                assert!(limits.contains_key(&kind), "missing {kind}");
            }
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[test]
fn set_resource_limits_applies_to_the_supervisor_and_round_trips() {
    let mut engine = test_engine();
    let mut limits = svpr_core::ResourceLimits::new();
    // Disabling core dumps is a harmless bound to flip on the test process
    // itself and cheap to verify came back through the kernel readback.
    limits.insert(svpr_core::LimitKind::Core, svpr_core::LimitBound { soft: Some(0), hard: None });

    match dispatch(&mut engine, 1, None, Request::SetResourceLimits { limits }) {
        Response::ResourceLimits { limits } => {
            assert_eq!(limits[&svpr_core::LimitKind::Core].soft, Some(0));
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    match dispatch(&mut engine, 1, None, Request::GetResourceLimits) {
        Response::ResourceLimits { limits } => {
            assert_eq!(limits[&svpr_core::LimitKind::Core].soft, Some(0));
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}
