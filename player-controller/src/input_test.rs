#[cfg(test)]
mod tests {
    use std::time::Duration;
    use proptest::prelude::*;
    use tokio::sync::mpsc;
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use crate::config::InputConfig;
    use crate::input::{normalize_key, InputController};
    use crate::testing::RecordingSink;
    use crate::types::{FocusTarget, InputEvent, KeyInput, PhysicalKey, PlayerCommand};

    fn controller() -> InputController {
        InputController::new(InputConfig::default())
    }

    fn down(key: &str) -> InputEvent {
        InputEvent::KeyDown(KeyInput::new(key))
    }

    fn up(key: &str) -> InputEvent {
        InputEvent::KeyUp(KeyInput::new(key))
    }

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    /// Feed a press and release of space, firing the hold timer if it would
    /// have elapsed by the release.
    fn press_space_for(controller: &mut InputController, held: Duration) -> Vec<PlayerCommand> {
        let t0 = Instant::now();
        let mut commands = controller.handle(&down(" "), t0);
        let release = t0 + held;
        if let Some(deadline) = controller.hold_deadline() {
            if deadline <= release {
                commands.extend(controller.on_hold_elapsed(deadline));
            }
        }
        commands.extend(controller.handle(&up(" "), release));
        commands
    }

    #[test]
    fn test_space_tap_toggles_play_pause() {
        let mut controller = controller();
        assert_eq!(press_space_for(&mut controller, ms(200)), vec![PlayerCommand::PlayPause]);
        assert!(controller.hold_state().is_none());
    }

    #[test]
    fn test_k_toggles_once_and_never_holds() {
        let mut controller = controller();
        let t0 = Instant::now();

        assert_eq!(controller.handle(&down("k"), t0), vec![PlayerCommand::PlayPause]);
        assert!(controller.hold_deadline().is_none());
        assert!(controller.hold_state().is_none());

        let repeat = InputEvent::KeyDown(KeyInput::new("k").repeated());
        assert!(controller.handle(&repeat, t0 + ms(1600)).is_empty());
        assert!(controller.handle(&up("k"), t0 + ms(3000)).is_empty());
        assert!(controller.hold_state().is_none());
    }

    #[test]
    fn test_space_hold_engages_fast_rate_without_toggle() {
        let mut controller = controller();
        assert_eq!(
            press_space_for(&mut controller, ms(2500)),
            vec![
                PlayerCommand::SetPlaybackRate(2.0),
                PlayerCommand::SetPlaybackRate(1.0)
            ]
        );
    }

    #[test]
    fn test_hold_deadline_is_threshold_after_press() {
        let mut controller = controller();
        let t0 = Instant::now();
        controller.handle(&down(" "), t0);
        assert_eq!(controller.hold_deadline(), Some(t0 + ms(1500)));

        // Firing early does nothing
        assert!(controller.on_hold_elapsed(t0 + ms(1499)).is_empty());
        assert_eq!(
            controller.on_hold_elapsed(t0 + ms(1500)),
            vec![PlayerCommand::SetPlaybackRate(2.0)]
        );
        // Engaged holds have no pending deadline and never fire twice
        assert_eq!(controller.hold_deadline(), None);
        assert!(controller.on_hold_elapsed(t0 + ms(5000)).is_empty());
    }

    #[test]
    fn test_key_repeat_does_not_restart_hold() {
        let mut controller = controller();
        let t0 = Instant::now();
        controller.handle(&down(" "), t0);
        let repeat = InputEvent::KeyDown(KeyInput::new(" ").repeated());
        for i in 1..20 {
            assert!(controller.handle(&repeat, t0 + ms(i * 50)).is_empty());
        }
        // A non-repeat duplicate keydown also keeps the original press time
        controller.handle(&down(" "), t0 + ms(1200));
        assert_eq!(controller.hold_deadline(), Some(t0 + ms(1500)));
    }

    #[test]
    fn test_key_bindings() {
        let mut controller = controller();
        let now = Instant::now();
        let cases = [
            ("k", PlayerCommand::PlayPause),
            ("K", PlayerCommand::PlayPause),
            ("f", PlayerCommand::ToggleFullscreen),
            ("F", PlayerCommand::ToggleFullscreen),
            ("ArrowLeft", PlayerCommand::SeekBy(-10.0)),
            ("ArrowRight", PlayerCommand::SeekBy(10.0)),
            ("ArrowUp", PlayerCommand::SetVolumeBy(0.1)),
            ("ArrowDown", PlayerCommand::SetVolumeBy(-0.1)),
            (",", PlayerCommand::PrevEpisode),
            (".", PlayerCommand::NextEpisode),
        ];
        for (key, expected) in cases {
            assert_eq!(controller.handle(&down(key), now), vec![expected], "key {:?}", key);
        }
        assert_eq!(
            controller.handle(&InputEvent::DoubleClick, now),
            vec![PlayerCommand::ToggleFullscreen]
        );
    }

    #[test]
    fn test_cyrillic_layout_equivalents() {
        let mut controller = controller();
        let now = Instant::now();
        assert_eq!(controller.handle(&down("а"), now), vec![PlayerCommand::ToggleFullscreen]);
        assert_eq!(controller.handle(&down("А"), now), vec![PlayerCommand::ToggleFullscreen]);
        assert_eq!(controller.handle(&down("л"), now), vec![PlayerCommand::PlayPause]);
        assert_eq!(controller.handle(&down("к"), now), vec![PlayerCommand::PlayPause]);
        assert_eq!(controller.handle(&down("б"), now), vec![PlayerCommand::PrevEpisode]);
        assert_eq!(controller.handle(&down("Ю"), now), vec![PlayerCommand::NextEpisode]);
    }

    #[test]
    fn test_code_fallback_for_unknown_layouts() {
        let input = KeyInput::new("ф").with_code("KeyF");
        assert_eq!(normalize_key(&input), Some(PhysicalKey::F));
        assert_eq!(normalize_key(&KeyInput::new("q").with_code("KeyQ")), None);
        assert_eq!(normalize_key(&KeyInput::new("x")), None);
    }

    #[test]
    fn test_text_field_focus_is_ignored() {
        let mut controller = controller();
        let now = Instant::now();
        for key in [" ", "k", "f", "ArrowLeft", ","] {
            let typed = InputEvent::KeyDown(KeyInput::new(key).focused_on(FocusTarget::TextField));
            assert!(controller.handle(&typed, now).is_empty());
        }
        assert!(controller.hold_state().is_none());
    }

    #[test]
    fn test_release_in_text_field_still_ends_hold() {
        let mut controller = controller();
        let t0 = Instant::now();
        controller.handle(&down(" "), t0);
        controller.on_hold_elapsed(t0 + ms(1500));

        let released = InputEvent::KeyUp(KeyInput::new(" ").focused_on(FocusTarget::TextField));
        assert_eq!(
            controller.handle(&released, t0 + ms(1800)),
            vec![PlayerCommand::SetPlaybackRate(1.0)]
        );
    }

    #[test]
    fn test_repeat_ignored_for_toggles_but_not_arrows() {
        let mut controller = controller();
        let now = Instant::now();
        let repeated_f = InputEvent::KeyDown(KeyInput::new("f").repeated());
        assert!(controller.handle(&repeated_f, now).is_empty());
        let repeated_left = InputEvent::KeyDown(KeyInput::new("ArrowLeft").repeated());
        assert_eq!(controller.handle(&repeated_left, now), vec![PlayerCommand::SeekBy(-10.0)]);
    }

    #[test]
    fn test_teardown_clears_hold() {
        let mut controller = controller();
        let t0 = Instant::now();
        controller.handle(&down(" "), t0);
        assert!(controller.teardown().is_empty());
        assert!(controller.hold_deadline().is_none());
        // A release after teardown is not a tap
        assert!(controller.handle(&up(" "), t0 + ms(100)).is_empty());

        controller.handle(&down(" "), t0);
        controller.on_hold_elapsed(t0 + ms(1500));
        assert_eq!(controller.teardown(), vec![PlayerCommand::SetPlaybackRate(1.0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_fires_hold_timer_once() {
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let mut controller = controller();
        let mut sink = RecordingSink::default();

        let driver = async {
            tx.send(down(" ")).await.unwrap();
            for _ in 0..5 {
                tokio::time::sleep(ms(400)).await;
                tx.send(InputEvent::KeyDown(KeyInput::new(" ").repeated())).await.unwrap();
            }
            tokio::time::sleep(ms(500)).await;
            tx.send(up(" ")).await.unwrap();
            tokio::time::sleep(ms(10)).await;
            cancel.cancel();
        };

        tokio::join!(controller.run(rx, &mut sink, cancel.clone()), driver);

        assert_eq!(
            sink.commands,
            vec![
                PlayerCommand::SetPlaybackRate(2.0),
                PlayerCommand::SetPlaybackRate(1.0)
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_short_press_toggles_exactly_once(held in 0u64..1500) {
            let mut controller = controller();
            let commands = press_space_for(&mut controller, ms(held));
            prop_assert_eq!(commands, vec![PlayerCommand::PlayPause]);
        }

        #[test]
        fn prop_long_press_never_toggles(held in 1500u64..10_000) {
            let mut controller = controller();
            let commands = press_space_for(&mut controller, ms(held));
            prop_assert!(!commands.contains(&PlayerCommand::PlayPause));
            prop_assert_eq!(commands.last(), Some(&PlayerCommand::SetPlaybackRate(1.0)));
        }
    }
}
