use idf_error::BuildErrorKind;
use idf_hal::{FakeHal, FakeResponse, Operation, ProcessSpec};
use idf_workflow::{
    Activity, ActivityGuard, BuildCoordinator, BuildOutcome, CancelToken, FlashType, NotifyLevel,
    RecordingNotifier, Settings, Workspace,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const ROOT: &str = "/ws/blink";
const SIZE_JSON: &str = r#"{"dram_data":11832,"dram_bss":4264,"used_dram":16096,"available_dram":164640,"used_iram":52243,"available_iram":78829,"flash_code":102431,"flash_rodata":40132,"total_size":206638}"#;

struct Fixture {
    hal: FakeHal,
    notifier: RecordingNotifier,
    activity: Arc<ActivityGuard>,
    coordinator: BuildCoordinator,
    workspace: Workspace,
}

fn fixture(extra_settings: &str) -> Fixture {
    let hal = FakeHal::new();
    hal.add_file(
        "/ws/blink/build/project_description.json",
        r#"{"project_name":"blink","app_elf":"blink.elf","build_components":["main"]}"#,
    );
    hal.add_path("/ws/blink/build/blink.map");
    hal.on_command(
        |spec| spec.program == "python3",
        FakeResponse::Output(SIZE_JSON.to_string()),
    );

    let root = Path::new(ROOT);
    let text = format!("[idf]\nespIdfPath = \"/opt/esp-idf\"\n{}", extra_settings);
    let workspace = Workspace::new(root, Settings::from_toml_str(root, &text).unwrap());

    let notifier = RecordingNotifier::new();
    let activity = Arc::new(ActivityGuard::new());
    let coordinator = BuildCoordinator::new(Arc::new(hal.clone()), Arc::new(notifier.clone()))
        .with_activity(Arc::clone(&activity));
    Fixture {
        hal,
        notifier,
        activity,
        coordinator,
        workspace,
    }
}

impl Fixture {
    fn build(&self, cancel: &CancelToken, flash_type: FlashType) -> BuildOutcome {
        self.coordinator
            .build_command(&self.workspace, cancel, flash_type)
    }

    fn checked_flasher_args(&self) -> bool {
        self.hal.has_operation(|op| {
            matches!(op, Operation::PathExists { path } if path.ends_with("flasher_args.json"))
        })
    }

    fn ran_dfu(&self) -> bool {
        self.hal.commands().iter().any(|c| c.ends_with("--target dfu"))
    }
}

#[test]
fn busy_guard_rejects_without_running_any_step() {
    let f = fixture("");
    let flash = f.activity.try_acquire(Activity::Flash).unwrap();

    let outcome = f.build(&CancelToken::new(), FlashType::Uart);

    assert_eq!(outcome, BuildOutcome::Rejected);
    assert!(!outcome.continue_flag());
    assert_eq!(f.hal.operation_count(), 0);
    assert!(f
        .notifier
        .contains(NotifyLevel::Error, "Wait for ESP-IDF build or flash to finish"));
    assert_eq!(f.activity.current(), Some(Activity::Flash));
    drop(flash);
}

#[test]
fn successful_build_notifies_once_and_disposes_listeners() {
    let f = fixture("");
    f.coordinator.tasks().add_listener(|_| {});

    let outcome = f.build(&CancelToken::new(), FlashType::Uart);

    assert_eq!(outcome, BuildOutcome::Succeeded);
    assert!(outcome.continue_flag());
    assert_eq!(f.notifier.count(NotifyLevel::Info), 1);
    assert!(f.notifier.contains(NotifyLevel::Info, "Build Successfully"));
    assert_eq!(f.notifier.count(NotifyLevel::Error), 0);
    assert_eq!(f.coordinator.tasks().listener_count(), 0);
    assert!(!f.activity.is_busy());
    assert_eq!(
        f.hal.commands(),
        vec![
            "cmake -G Ninja -S /ws/blink -B /ws/blink/build -DIDF_TARGET=esp32 -DPYTHON_DEPS_CHECKED=1 -DESP_PLATFORM=1",
            "cmake --build /ws/blink/build",
            "python3 /opt/esp-idf/tools/idf_size.py /ws/blink/build/blink.map --format json",
        ]
    );
}

#[test]
fn non_dfu_flash_types_skip_artifact_and_target_checks() {
    for flash_type in [FlashType::Uart, FlashType::Jtag] {
        let f = fixture("adapterTargetName = \"esp32c3\"\n");
        let outcome = f.build(&CancelToken::new(), flash_type);

        assert_eq!(outcome, BuildOutcome::Succeeded);
        assert!(!f.checked_flasher_args());
        assert_eq!(f.notifier.count(NotifyLevel::Warn), 0);
        assert!(!f.ran_dfu());
    }
}

#[test]
fn hooks_wrap_the_build() {
    let f = fixture("preBuildTask = \"./pre.sh\"\npostBuildTask = \"./post.sh\"\n");

    assert_eq!(
        f.build(&CancelToken::new(), FlashType::Uart),
        BuildOutcome::Succeeded
    );

    let commands = f.hal.commands();
    let pos = |needle: &str| commands.iter().position(|c| c.contains(needle)).unwrap();
    assert!(pos("sh -c ./pre.sh") < pos("cmake -G"));
    assert!(pos("cmake --build") < pos("idf_size.py"));
    assert!(pos("idf_size.py") < pos("sh -c ./post.sh"));
}

#[test]
fn dfu_without_flasher_args_reports_error_and_skips_dfu() {
    let f = fixture("adapterTargetName = \"esp32s2\"\n");

    let outcome = f.build(&CancelToken::new(), FlashType::Dfu);

    assert_eq!(
        outcome,
        BuildOutcome::Failed(BuildErrorKind::MissingFlasherArgs)
    );
    assert!(f
        .notifier
        .contains(NotifyLevel::Error, "flasher_args.json file is missing"));
    assert!(!f.ran_dfu());
    assert!(!f.notifier.contains(NotifyLevel::Info, "Build Successfully"));
    assert!(!f.activity.is_busy());
}

#[test]
fn dfu_on_unsupported_target_warns_without_error() {
    let f = fixture("adapterTargetName = \"esp32\"\n");
    f.hal.add_path("/ws/blink/build/flasher_args.json");

    let outcome = f.build(&CancelToken::new(), FlashType::Dfu);

    assert_eq!(
        outcome,
        BuildOutcome::DfuUnsupported {
            target: "esp32".to_string()
        }
    );
    assert!(outcome.continue_flag());
    assert!(f
        .notifier
        .contains(NotifyLevel::Warn, "\"esp32\" is not compatible for DFU"));
    assert_eq!(f.notifier.count(NotifyLevel::Error), 0);
    assert!(!f.ran_dfu());
    assert!(!f.activity.is_busy());
}

#[test]
fn dfu_on_supported_target_builds_dfu_image() {
    for target in ["esp32s2", "esp32s3"] {
        let f = fixture(&format!("adapterTargetName = \"{}\"\n", target));
        f.hal.add_path("/ws/blink/build/flasher_args.json");

        let outcome = f.build(&CancelToken::new(), FlashType::Dfu);

        assert_eq!(outcome, BuildOutcome::Succeeded);
        assert!(f.checked_flasher_args());
        assert!(f.ran_dfu());
        assert!(f.notifier.contains(NotifyLevel::Info, "Build Successfully"));
    }
}

#[test]
fn terminated_step_warns_and_clears_guard() {
    let f = fixture("");
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    f.hal.on_command_with_hook(
        |spec: &ProcessSpec| spec.has_arg("--build"),
        FakeResponse::Hang,
        move || trigger.cancel(),
    );

    let outcome = f.build(&cancel, FlashType::Uart);

    assert_eq!(outcome, BuildOutcome::Terminated);
    assert!(!outcome.continue_flag());
    assert!(f.notifier.contains(NotifyLevel::Warn, "Terminated"));
    assert_eq!(f.notifier.count(NotifyLevel::Error), 0);
    assert!(!f.activity.is_busy());
    assert!(!f.hal.commands().iter().any(|c| c.contains("idf_size.py")));
}

#[test]
fn cancel_mid_sequence_lets_step_finish_and_skips_success() {
    let f = fixture("postBuildTask = \"./post.sh\"\n");
    f.coordinator.tasks().add_listener(|_| {});
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let guard = Arc::clone(&f.activity);
    let busy_during_size = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&busy_during_size);
    // Cancels while the size step is in flight; the step itself still completes.
    f.hal.on_command_with_hook(
        |spec: &ProcessSpec| spec.program == "python3",
        FakeResponse::Output(SIZE_JSON.to_string()),
        move || {
            if guard.is_busy() {
                seen.fetch_add(1, Ordering::SeqCst);
            }
            trigger.cancel();
        },
    );

    let outcome = f.build(&cancel, FlashType::Uart);

    assert_eq!(busy_during_size.load(Ordering::SeqCst), 1);
    assert_eq!(outcome, BuildOutcome::Terminated);
    assert!(f.hal.commands().iter().any(|c| c.contains("idf_size.py")));
    assert!(!f.hal.commands().iter().any(|c| c.contains("./post.sh")));
    assert!(!f.notifier.contains(NotifyLevel::Info, "Build Successfully"));
    assert_eq!(f.coordinator.tasks().listener_count(), 0);
    assert!(!f.activity.is_busy());
}

#[test]
fn cancel_during_final_step_skips_success_without_notifying() {
    let f = fixture("postBuildTask = \"./post.sh\"\n");
    f.coordinator.tasks().add_listener(|_| {});
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    f.hal.on_command_with_hook(
        |spec: &ProcessSpec| spec.has_arg("./post.sh"),
        FakeResponse::Output(String::new()),
        move || trigger.cancel(),
    );

    let outcome = f.build(&cancel, FlashType::Uart);

    assert_eq!(outcome, BuildOutcome::CancelledAfterCompletion);
    assert!(outcome.continue_flag());
    assert!(f.notifier.notifications().is_empty());
    assert_eq!(f.coordinator.tasks().listener_count(), 0);
    assert!(!f.activity.is_busy());
}

#[test]
fn failing_task_reports_generic_error_with_cause() {
    let f = fixture("");
    f.hal.on_command(
        |spec| spec.has_arg("--build"),
        FakeResponse::Fail {
            code: 1,
            stderr: "main.c:12: undefined reference to `app_main'".to_string(),
        },
    );

    let outcome = f.build(&CancelToken::new(), FlashType::Uart);

    assert_eq!(outcome, BuildOutcome::Failed(BuildErrorKind::Task));
    let errors: Vec<_> = f
        .notifier
        .notifications()
        .into_iter()
        .filter(|n| n.level == NotifyLevel::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].message,
        "Something went wrong while trying to build the project"
    );
    assert!(errors[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("undefined reference"));
    assert_eq!(errors[0].tags, vec!["Build".to_string()]);
    assert!(!f.activity.is_busy());
}

#[test]
fn concurrent_task_flush_maps_to_already_building() {
    let f = fixture("");
    f.hal
        .on_command(|spec| spec.program == "sleep", FakeResponse::Hang);
    let other_cancel = CancelToken::new();
    let tasks = f.coordinator.tasks().clone();
    tasks.add_task("other", ProcessSpec::new("sleep").arg("60"));
    let runner_cancel = other_cancel.clone();
    let runner = tasks.clone();
    let handle = std::thread::spawn(move || runner.run_tasks(&runner_cancel));
    while !tasks.is_running() {
        std::thread::yield_now();
    }

    let outcome = f.build(&CancelToken::new(), FlashType::Uart);

    other_cancel.cancel();
    let _ = handle.join().unwrap();
    assert_eq!(outcome, BuildOutcome::Failed(BuildErrorKind::AlreadyBuilding));
    assert!(f
        .notifier
        .contains(NotifyLevel::Error, "Already a build is running!"));
    assert!(!f.activity.is_busy());
}

#[test]
fn guard_is_reusable_after_failure() {
    let f = fixture("");
    let cancel = CancelToken::new();
    cancel.cancel();
    assert_eq!(f.build(&cancel, FlashType::Uart), BuildOutcome::Terminated);

    assert_eq!(
        f.build(&CancelToken::new(), FlashType::Uart),
        BuildOutcome::Succeeded
    );
}
