use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time;

use crate::config::{ProvisionConfig, SupervisorConfig, TunnelConfig};
use crate::error::TunnelError;
use crate::events::{EventKind, StageStatus};
use crate::policies::RestartPolicy;
use crate::process::{launch, LaunchSpec, ProcessHandle};
use crate::stages::Stage;
use crate::supervisor::{SupervisorState, TunnelSupervisor};

/// Transport stub: prints the readiness marker, then stays alive.
const LIVE_TRANSPORT: &str = "echo dialing\necho 'Connection confirmed.'\nexec sleep 60";
/// Forwarder stub: quiet survivor.
const LIVE_FORWARDER: &str = "exec sleep 60";

struct Rig {
    dir: TempDir,
    sup: TunnelSupervisor,
}

fn write_stub(root: &Path, name: &str, body: &str) {
    let assets = root.join("assets");
    std::fs::create_dir_all(&assets).unwrap();
    std::fs::write(assets.join(name), format!("#!/bin/sh\n{body}\n")).unwrap();
}

/// Builds a supervisor over two shell stubs. `tag` keeps binary names
/// unique per test, so the stray-process sweep of one test cannot touch
/// another's children.
fn rig_with(
    tag: &str,
    stage1: &str,
    stage2: &str,
    tweak: impl FnOnce(&mut SupervisorConfig),
) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let s1 = format!("tv-{tag}-s1");
    let s2 = format!("tv-{tag}-s2");
    write_stub(dir.path(), &s1, stage1);
    write_stub(dir.path(), &s2, stage2);

    let mut cfg = SupervisorConfig {
        stage1_binary: s1,
        stage2_binary: s2,
        stage1_ready_timeout: Duration::from_secs(5),
        stage2_settle: Duration::from_millis(100),
        monitor_interval: Duration::from_millis(100),
        kill_grace: Duration::from_millis(500),
        provision: ProvisionConfig {
            source_dir: dir.path().join("assets"),
            install_dir: dir.path().join("bin"),
            always_copy: false,
        },
        ..SupervisorConfig::default()
    };
    tweak(&mut cfg);
    Rig {
        sup: TunnelSupervisor::new(cfg, Vec::new()),
        dir,
    }
}

fn rig(tag: &str, stage1: &str, stage2: &str) -> Rig {
    rig_with(tag, stage1, stage2, |_| {})
}

fn profile() -> TunnelConfig {
    TunnelConfig {
        resolvers: vec!["1.1.1.1:53".into()],
        domain: "example.com".into(),
        local_port: 1080,
        key_path: None,
    }
}

fn kill9(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
}

async fn wait_for(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let end = time::Instant::now() + deadline;
    while time::Instant::now() < end {
        if cond() {
            return true;
        }
        time::sleep(Duration::from_millis(50)).await;
    }
    cond()
}

#[tokio::test]
async fn happy_path_reaches_running_and_stops_clean() {
    let rig = rig("ok", LIVE_TRANSPORT, LIVE_FORWARDER);

    rig.sup.apply(profile()).await.unwrap();
    assert_eq!(rig.sup.state(), SupervisorState::Running);
    assert!(rig.sup.status().is_running());
    let (p1, p2) = rig.sup.pids().await;
    assert!(p1.is_some() && p2.is_some());

    rig.sup.stop().await;
    assert_eq!(rig.sup.state(), SupervisorState::Idle);
    assert_eq!(rig.sup.status(), crate::events::StatusSnapshot::stopped());
    assert_eq!(rig.sup.pids().await, (None, None));
}

#[tokio::test]
async fn apply_publishes_transitions_and_log_lines() {
    let rig = rig("ev", LIVE_TRANSPORT, LIVE_FORWARDER);
    let mut rx = rig.sup.subscribe();

    rig.sup.apply(profile()).await.unwrap();

    let mut saw_stopping = false;
    let mut saw_marker_line = false;
    let mut saw_running = false;
    let scan = time::timeout(Duration::from_secs(2), async {
        while let Ok(ev) = rx.recv().await {
            match &ev.kind {
                EventKind::Status(snap) => {
                    if snap.tunnel == StageStatus::Stopping {
                        saw_stopping = true;
                    }
                    if snap.is_running() {
                        saw_running = true;
                        break;
                    }
                }
                EventKind::Log { stage, line } => {
                    if *stage == Stage::Tunnel && line.contains("Connection confirmed.") {
                        saw_marker_line = true;
                    }
                }
                EventKind::ObserverOverflow { .. } => {}
            }
        }
    })
    .await;
    assert!(scan.is_ok(), "never observed Running/Running");
    assert!(saw_stopping, "cleanup status was not published");
    assert!(saw_marker_line, "readiness output was not forwarded");
    assert!(saw_running);
}

#[tokio::test]
async fn transport_crash_fails_without_launching_forwarder() {
    let rig = rig(
        "crash1",
        "echo cannot resolve >&2\nexit 1",
        "touch \"$0.ran\"\nexec sleep 60",
    );

    let err = rig.sup.apply(profile()).await.unwrap_err();
    match &err {
        TunnelError::ProcessCrashed {
            stage: Stage::Tunnel,
            code,
            output,
        } => {
            assert_eq!(*code, Some(1));
            assert!(output.contains("cannot resolve"), "got: {output}");
        }
        other => panic!("expected transport crash, got {other:?}"),
    }
    assert_eq!(rig.sup.state(), SupervisorState::Failed);
    assert_eq!(rig.sup.status().tunnel.as_label(), "failed");
    assert_eq!(rig.sup.pids().await, (None, None));
    // The forwarder stub marks its launch; it must never have run.
    assert!(!rig.dir.path().join("bin/tv-crash1-s2.ran").exists());
}

#[tokio::test]
async fn transport_timeout_fails_and_kills_it() {
    let rig = rig_with("slow1", "exec sleep 60", LIVE_FORWARDER, |cfg| {
        cfg.stage1_ready_timeout = Duration::from_millis(300);
    });

    let err = rig.sup.apply(profile()).await.unwrap_err();
    assert!(matches!(
        err,
        TunnelError::ReadinessTimeout {
            stage: Stage::Tunnel,
            ..
        }
    ));
    assert_eq!(rig.sup.state(), SupervisorState::Failed);
    assert_eq!(rig.sup.pids().await, (None, None));
}

#[tokio::test]
async fn forwarder_crash_takes_the_transport_down_too() {
    let rig = rig("crash2", LIVE_TRANSPORT, "echo permission denied >&2\nexit 255");

    let err = rig.sup.apply(profile()).await.unwrap_err();
    match &err {
        TunnelError::ProcessCrashed {
            stage: Stage::Forwarder,
            code,
            output,
        } => {
            assert_eq!(*code, Some(255));
            assert!(output.contains("permission denied"), "got: {output}");
        }
        other => panic!("expected forwarder crash, got {other:?}"),
    }
    // No orphaned transport behind a dead forwarder.
    assert_eq!(rig.sup.pids().await, (None, None));
    let status = rig.sup.status();
    assert_eq!(status.tunnel, StageStatus::Stopped);
    assert_eq!(status.forwarder.as_label(), "failed");
}

#[tokio::test]
async fn duplicate_apply_is_a_noop() {
    let rig = rig("dup", LIVE_TRANSPORT, LIVE_FORWARDER);

    rig.sup.apply(profile()).await.unwrap();
    let before = rig.sup.pids().await;
    rig.sup.apply(profile()).await.unwrap();
    assert_eq!(rig.sup.pids().await, before);
}

#[tokio::test]
async fn changed_profile_replaces_both_processes() {
    let rig = rig("swap", LIVE_TRANSPORT, LIVE_FORWARDER);

    rig.sup.apply(profile()).await.unwrap();
    let (p1, p2) = rig.sup.pids().await;

    let mut next = profile();
    next.domain = "other.example.com".into();
    rig.sup.apply(next).await.unwrap();
    let (q1, q2) = rig.sup.pids().await;

    assert!(q1.is_some() && q2.is_some());
    assert_ne!(p1, q1, "transport was not replaced");
    assert_ne!(p2, q2, "forwarder was not replaced");
}

#[tokio::test]
async fn stop_during_start_leaves_nothing_alive() {
    let rig = rig_with("stopmid", "exec sleep 60", LIVE_FORWARDER, |cfg| {
        cfg.stage1_ready_timeout = Duration::from_secs(2);
    });

    let sup = rig.sup.clone();
    let apply_task = tokio::spawn(async move { sup.apply(profile()).await });
    time::sleep(Duration::from_millis(200)).await;

    // Blocks until the in-flight apply resolves, then tears down.
    rig.sup.stop().await;
    let apply_result = apply_task.await.unwrap();

    assert!(apply_result.is_err());
    assert_eq!(rig.sup.state(), SupervisorState::Idle);
    assert_eq!(rig.sup.pids().await, (None, None));
}

#[tokio::test]
async fn monitor_restarts_a_killed_transport() {
    let rig = rig("restart", LIVE_TRANSPORT, LIVE_FORWARDER);

    rig.sup.apply(profile()).await.unwrap();
    let (p1, _) = rig.sup.pids().await;
    let old = p1.unwrap();
    kill9(old);

    let end = time::Instant::now() + Duration::from_secs(3);
    let mut recovered = false;
    while time::Instant::now() < end {
        let (p1, p2) = rig.sup.pids().await;
        if let (Some(new), Some(_)) = (p1, p2) {
            if new != old && rig.sup.status().is_running() {
                recovered = true;
                break;
            }
        }
        time::sleep(Duration::from_millis(50)).await;
    }
    assert!(recovered, "monitor never restarted the chain");
    rig.sup.stop().await;
}

#[tokio::test]
async fn monitor_gives_up_when_restarts_are_disabled() {
    let rig = rig_with("giveup", LIVE_TRANSPORT, LIVE_FORWARDER, |cfg| {
        cfg.restart = RestartPolicy::Never;
    });

    rig.sup.apply(profile()).await.unwrap();
    let (p1, _) = rig.sup.pids().await;
    kill9(p1.unwrap());

    let sup = rig.sup.clone();
    let failed = wait_for(Duration::from_secs(3), move || {
        sup.state() == SupervisorState::Failed
    })
    .await;
    assert!(failed, "monitor never gave up");
    assert_eq!(rig.sup.pids().await, (None, None));
    assert_eq!(rig.sup.status().tunnel.as_label(), "failed");
}

#[tokio::test]
async fn limited_policy_bounds_the_crash_loop() {
    // Transport confirms readiness, then exits immediately: a crash loop.
    let rig = rig_with(
        "limited",
        "echo 'Connection confirmed.'\nexit 0",
        LIVE_FORWARDER,
        |cfg| {
            cfg.restart = RestartPolicy::Limited(1);
        },
    );

    rig.sup.apply(profile()).await.unwrap();
    let sup = rig.sup.clone();
    let failed = wait_for(Duration::from_secs(5), move || {
        sup.state() == SupervisorState::Failed
    })
    .await;
    assert!(failed, "crash loop was never bounded");
    assert_eq!(rig.sup.pids().await, (None, None));
}

#[tokio::test]
async fn stop_during_forwarder_settle_leaves_nothing_alive() {
    let rig = rig_with("stopfwd", LIVE_TRANSPORT, LIVE_FORWARDER, |cfg| {
        cfg.stage2_settle = Duration::from_secs(2);
    });

    let sup = rig.sup.clone();
    let apply_task = tokio::spawn(async move { sup.apply(profile()).await });

    // Catch the apply inside the settle window, then stop into it.
    let sup = rig.sup.clone();
    let mid_settle = wait_for(Duration::from_secs(2), move || {
        sup.state() == SupervisorState::StartingForwarder
    })
    .await;
    assert!(mid_settle, "apply never reached the forwarder phase");

    rig.sup.stop().await;
    let apply_result = apply_task.await.unwrap();

    assert!(apply_result.is_ok());
    assert_eq!(rig.sup.state(), SupervisorState::Idle);
    assert_eq!(rig.sup.pids().await, (None, None));
}

#[tokio::test]
async fn monitor_restart_yields_to_concurrent_apply() {
    let rig = rig("race", LIVE_TRANSPORT, LIVE_FORWARDER);

    rig.sup.apply(profile()).await.unwrap();
    let (p1, _) = rig.sup.pids().await;
    kill9(p1.unwrap());

    // Race the monitor's restart against an explicit apply of a new
    // profile. Both go through the same lock, so whichever wins, the
    // explicit apply's profile is what ends up applied.
    let mut next = profile();
    next.domain = "other.example.com".into();
    rig.sup.apply(next.clone()).await.unwrap();
    assert!(rig.sup.status().is_running());
    let settled = rig.sup.pids().await;
    assert!(settled.0.is_some() && settled.1.is_some());

    // A stale monitor generation must not restart behind our back.
    time::sleep(Duration::from_millis(500)).await;
    assert_eq!(rig.sup.pids().await, settled);
    assert!(rig.sup.status().is_running());

    // Reapplying the same profile is a no-op, confirming it is the one in
    // effect.
    rig.sup.apply(next).await.unwrap();
    assert_eq!(rig.sup.pids().await, settled);
    rig.sup.stop().await;
}

#[tokio::test]
async fn sweep_spares_forwarder_named_processes() {
    let rig = rig("sweep", LIVE_TRANSPORT, LIVE_FORWARDER);

    // Decoys carrying the stage binary names; the loop keeps the shell (and
    // with it the process name) alive.
    fn spawn_decoy(root: &Path, name: &str) -> ProcessHandle {
        use std::os::unix::fs::PermissionsExt;
        let path = root.join(name);
        std::fs::write(&path, "#!/bin/sh\nwhile :; do sleep 1; done\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        launch(
            Stage::Tunnel,
            &LaunchSpec {
                program: path,
                args: Vec::new(),
                envs: Vec::new(),
                work_dir: None,
                merge_stderr: true,
            },
        )
        .unwrap()
    }
    let mut stray_transport = spawn_decoy(rig.dir.path(), "tv-sweep-s1");
    let mut stray_forwarder = spawn_decoy(rig.dir.path(), "tv-sweep-s2");
    assert!(stray_transport.is_alive());
    assert!(stray_forwarder.is_alive());

    rig.sup.apply(profile()).await.unwrap();

    // Cleanup sweeps transport orphans by name...
    let swept = wait_for(Duration::from_secs(2), move || !stray_transport.is_alive()).await;
    assert!(swept, "stray transport survived the sweep");
    // ...but never the forwarder name: it may be a shared system client.
    assert!(stray_forwarder.is_alive(), "forwarder-named process was swept");

    stray_forwarder.kill(Duration::from_millis(500)).await;
    rig.sup.stop().await;
}

#[tokio::test]
async fn rejected_profile_touches_nothing() {
    let rig = rig("reject", LIVE_TRANSPORT, LIVE_FORWARDER);

    let mut bad = profile();
    bad.domain.clear();
    let err = rig.sup.apply(bad).await.unwrap_err();
    assert!(matches!(err, TunnelError::ConfigRejected(_)));
    assert_eq!(rig.sup.state(), SupervisorState::Idle);
    assert_eq!(rig.sup.pids().await, (None, None));
}
