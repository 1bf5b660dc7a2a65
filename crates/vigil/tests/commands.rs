use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stdext::assert_match;
use vigil::checker::CheckerConfig;
use vigil::commands::CommandOutcome;
use vigil::fixtures::hold_for;
use vigil::fixtures::RecordingEscalation;
use vigil::fixtures::TestLockSet;
use vigil::monitor::FreezeMonitor;
use vigil::registry::CheckOutcome;
use vigil::registry::LockRegistry;

fn monitor() -> (FreezeMonitor, Arc<Mutex<()>>, Arc<TestLockSet>) {
    let channels = Arc::new(Mutex::new(()));
    let queues = Arc::new(TestLockSet::new());
    queues.add("queue-a");
    queues.add("queue-b");

    let mut registry = LockRegistry::new();
    registry.register_fixed("channel", channels.clone());
    registry.register_dynamic("queue", queues.clone());

    let mut monitor =
        FreezeMonitor::with_escalation(registry, CheckerConfig::default(), RecordingEscalation::new());
    monitor.set_check_timeout(Duration::from_millis(100));

    (monitor, channels, queues)
}

#[test]
fn test_check_now_reports_and_never_escalates() {
    let (monitor, channels, _queues) = monitor();

    assert_eq!(monitor.check_now(), CheckOutcome::Ok);

    let holder = hold_for(channels, Duration::from_millis(600));
    assert_eq!(monitor.check_now(), CheckOutcome::Fail);
    holder.join().unwrap();

    // Recovered once the hold is gone
    assert_eq!(monitor.check_now(), CheckOutcome::Ok);
}

#[test]
fn test_check_now_alongside_the_running_checker() {
    let (mut monitor, _channels, _queues) = monitor();

    // Long interval: the periodic loop stays in its sleep for this test
    monitor.start().unwrap();
    assert_eq!(monitor.check_now(), CheckOutcome::Ok);
    monitor.stop();
}

#[test]
fn test_check_command_reports_status() {
    let (monitor, channels, _queues) = monitor();

    assert_match!(
        monitor.commands().dispatch("check"),
        CommandOutcome::Success(reply) => {
            assert!(reply.contains("fine"));
        }
    );

    let holder = hold_for(channels, Duration::from_millis(600));
    assert_match!(
        monitor.commands().dispatch("check"),
        CommandOutcome::Failure(reply) => {
            assert!(reply.contains("DEADLOCKED"));
        }
    );
    holder.join().unwrap();
}

#[test]
fn test_gate_toggle_controls_direct_locks() {
    let (monitor, channels, _queues) = monitor();
    let commands = monitor.commands();

    // Gate off: denial
    assert_match!(
        commands.dispatch("channel lock"),
        CommandOutcome::Failure(reply) => {
            assert_eq!(reply, "Dangerous freeze commands are disabled.");
        }
    );
    assert!(!monitor.gate().is_enabled());

    // Gate on: the lock is really held afterwards
    commands.dispatch("enable");
    assert!(monitor.gate().is_enabled());

    assert_match!(
        commands.dispatch("channel lock"),
        CommandOutcome::Success(reply) => {
            assert_eq!(reply, "The 'channel' lock is now LOCKED.");
        }
    );
    assert!(channels.try_lock().is_none());

    // An on-demand check now sees the induced hang
    assert_eq!(monitor.check_now(), CheckOutcome::Fail);

    commands.dispatch("channel unlock");
    assert!(channels.try_lock().is_some());
    assert_eq!(monitor.check_now(), CheckOutcome::Ok);

    // And off again
    commands.dispatch("disable");
    assert_match!(
        commands.dispatch("channel lock"),
        CommandOutcome::Failure(_)
    );
}

#[test]
fn test_collection_commands_through_the_monitor() {
    let (monitor, _channels, queues) = monitor();
    let commands = monitor.commands();

    commands.dispatch("enable");

    commands.dispatch("queue lock");
    for lock in queues.member_locks() {
        assert!(lock.try_lock().is_none());
    }

    assert_eq!(monitor.check_now(), CheckOutcome::Fail);

    commands.dispatch("queue unlock");
    assert_eq!(monitor.check_now(), CheckOutcome::Ok);
}
