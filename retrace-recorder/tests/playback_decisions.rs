use retrace::{Bitmap, MouseButton, Tolerance};
use retrace_recorder::test_support::{FakeInput, FakeScreen, Injected};
use retrace_recorder::{
    Action, DecisionSignal, FailureHandler, PlaybackConfig, PlaybackOutcome, PlaybackRunner,
    Player, Region,
};
use std::sync::{Arc, Mutex};

const GREY: [u8; 4] = [90, 90, 90, 255];

fn player(input: &Arc<FakeInput>, screen: &Arc<FakeScreen>) -> Player {
    Player::new(input.clone(), screen.clone(), PlaybackConfig::default())
}

fn key_down(key: &str) -> Injected {
    Injected::KeyDown(key.to_string())
}

fn key_up(key: &str) -> Injected {
    Injected::KeyUp(key.to_string())
}

fn forced_check(timestamp: f64) -> Action {
    let mut action = Action::check(Bitmap::filled(16, 16, GREY), None, timestamp);
    if let Action::Check(check) = &mut action {
        check.force_fail = true;
    }
    action
}

fn recorded_click(x: i32, y: i32, timestamp: f64) -> Vec<Action> {
    let down = match Action::mouse_down(MouseButton::Left, x, y, timestamp) {
        Action::Mouse(m) => Action::Mouse(m.with_screenshot(Bitmap::filled(100, 100, GREY))),
        other => other,
    };
    vec![down, Action::mouse_up(MouseButton::Left, x, y, timestamp + 0.05)]
}

#[tokio::test(start_paused = true)]
async fn test_forced_check_then_continue() {
    let input = Arc::new(FakeInput::default());
    let screen = Arc::new(FakeScreen::solid(GREY));
    let actions = vec![
        Action::key_down("a", 0.0),
        Action::key_up("a", 0.02),
        forced_check(0.5),
        Action::key_down("b", 0.7),
        Action::key_up("b", 0.72),
    ];

    let signal = DecisionSignal::new();
    let handler = {
        let signal = signal.clone();
        move |_: usize, _: &Bitmap, _: &Bitmap| signal.continue_playback()
    };
    let outcome = player(&input, &screen)
        .play(&actions, Some(&handler), &signal)
        .await;

    assert!(outcome.succeeded());
    assert_eq!(
        input.presses(),
        vec![key_down("a"), key_up("a"), key_down("b"), key_up("b")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_forced_check_then_abort() {
    let input = Arc::new(FakeInput::default());
    let screen = Arc::new(FakeScreen::solid(GREY));
    let actions = vec![
        Action::key_down("a", 0.0),
        forced_check(0.5),
        Action::key_down("b", 0.7),
    ];

    let signal = DecisionSignal::new();
    let handler = {
        let signal = signal.clone();
        move |_: usize, _: &Bitmap, _: &Bitmap| signal.abort()
    };
    let outcome = player(&input, &screen)
        .play(&actions, Some(&handler), &signal)
        .await;

    assert_eq!(outcome.failed_index(), Some(1));
    assert_eq!(input.presses(), vec![key_down("a")]);
}

#[tokio::test(start_paused = true)]
async fn test_changed_screen_blocks_click() {
    let input = Arc::new(FakeInput::default());
    let screen = Arc::new(FakeScreen::solid(GREY));
    let mut actions = vec![Action::key_down("tab", 0.0)];
    actions.extend(recorded_click(200, 150, 0.3));
    actions.push(Action::key_down("enter", 0.6));

    // Unchanged screen: the click goes through.
    let outcome = player(&input, &screen)
        .play(&actions, None, &DecisionSignal::new())
        .await;
    assert!(outcome.succeeded());
    assert_eq!(
        input.presses(),
        vec![
            key_down("tab"),
            Injected::Down(MouseButton::Left),
            Injected::Up(MouseButton::Left),
            key_down("enter"),
        ]
    );

    // The target area changed well beyond the tolerance.
    let input = Arc::new(FakeInput::default());
    screen.set_colour([250, 10, 10, 255]);
    let outcome = player(&input, &screen)
        .play(&actions, None, &DecisionSignal::new())
        .await;
    match outcome {
        PlaybackOutcome::VisualCheckFailed {
            index,
            reference,
            actual,
        } => {
            assert_eq!(index, 1);
            assert_eq!(reference.dimensions(), actual.dimensions());
        }
        other => panic!("expected a visual failure, got {other:?}"),
    }
    assert_eq!(input.presses(), vec![key_down("tab")]);
}

#[tokio::test(start_paused = true)]
async fn test_tolerance_controls_small_differences() {
    let screen = Arc::new(FakeScreen::solid([95, 95, 95, 255]));
    let check = vec![Action::check(
        Bitmap::filled(10, 10, GREY),
        Some(Region::new(0, 0, 10, 10)),
        0.0,
    )];

    let lenient = Player::new(
        Arc::new(FakeInput::default()),
        screen.clone(),
        PlaybackConfig::default(),
    );
    assert!(lenient.play_once(&check).await.succeeded());

    let strict = Player::new(
        Arc::new(FakeInput::default()),
        screen,
        PlaybackConfig {
            tolerance: Tolerance::Custom(1.0),
            ..PlaybackConfig::default()
        },
    );
    assert_eq!(strict.play_once(&check).await.failed_index(), Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_runner_reports_failure_pair_and_continues() {
    let input = Arc::new(FakeInput::default());
    let screen = Arc::new(FakeScreen::solid(GREY));
    let runner = PlaybackRunner::new(player(&input, &screen));

    let failures = Arc::new(Mutex::new(Vec::new()));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handler: Arc<dyn FailureHandler> = {
        let failures = failures.clone();
        Arc::new(move |index: usize, reference: &Bitmap, actual: &Bitmap| {
            failures
                .lock()
                .unwrap()
                .push((index, reference.dimensions(), actual.dimensions()));
            let _ = tx.send(());
        })
    };

    let handle = runner
        .start(
            vec![
                Action::comment("before", 0.0),
                forced_check(0.1),
                Action::key_down("x", 0.2),
            ],
            Some(handler),
        )
        .await;
    rx.recv().await.unwrap();
    assert!(input.presses().is_empty());

    handle.signal().continue_playback();
    let outcome = handle.outcome().await.unwrap();
    assert!(outcome.succeeded());
    assert_eq!(*failures.lock().unwrap(), vec![(1, (16, 16), (16, 16))]);
    assert_eq!(input.presses(), vec![key_down("x")]);
}
