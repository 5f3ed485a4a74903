use item_player::error::AppResult;
use item_player::infrastructure::unit_dom::Target;
use item_player::models::ui::PointerTarget;
use item_player::models::unit_state::{LogLevel, PresentationProgress, ResponseProgress};
use item_player::models::{Notification, StateMessage, UiAction};
use item_player::services::FactorReport;
use item_player::{ChannelTransport, Config, Player, Runtime, UnitCtx};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// ========== 辅助函数 ==========

fn start(player: &mut Player, definition: &str, player_config: Value, now: Instant) {
    player.handle_message(
        &json!({
            "type": "vopStartCommand",
            "sessionId": "1",
            "unitDefinition": definition,
            "playerConfig": player_config,
        })
        .to_string(),
        now,
    );
}

fn started(definition: &str, player_config: Value) -> Player {
    let mut player = Player::new(Config::immediate());
    start(&mut player, definition, player_config, Instant::now());
    player
}

fn send(player: &mut Player, message: Value) {
    player.handle_message(&message.to_string(), Instant::now());
}

fn ui(player: &mut Player, action: UiAction) {
    player.handle_ui(action, Instant::now());
}

fn state_changes(player: &mut Player) -> Vec<StateMessage> {
    player
        .take_outbox()
        .into_iter()
        .filter_map(|n| match n {
            Notification::StateChanged(m) => Some(m),
            _ => None,
        })
        .collect()
}

/// 按顺序触发所有不晚于 `until` 的定时器
fn run_timers_until(player: &mut Player, until: Instant) {
    while let Some(deadline) = player.next_deadline() {
        if deadline > until {
            break;
        }
        player.on_timer(deadline);
    }
}

fn runtime_error_code(player: &mut Player) -> Option<String> {
    player.take_outbox().into_iter().find_map(|n| match n {
        Notification::RuntimeError { code, session_id, .. } => {
            assert_eq!(session_id.as_deref(), Some("1"));
            Some(code)
        }
        _ => None,
    })
}

fn answers_of(message: &StateMessage) -> Value {
    let raw = &message.unit_state.as_ref().unwrap().data_parts["answers"];
    serde_json::from_str(raw).unwrap()
}

// ========== 防抖 ==========

#[test]
fn test_state_messages_are_debounced() {
    let mut config = Config::immediate();
    config.debounce_state_messages_ms = 150;
    let mut player = Player::new(config);
    let t0 = Instant::now();

    start(&mut player, "<input name='a'><input name='b'>", json!({}), t0);
    assert!(state_changes(&mut player).is_empty());

    player.handle_ui(UiAction::set_value(Target::name("a"), "x"), t0 + Duration::from_millis(50));
    player.handle_ui(UiAction::set_value(Target::name("b"), "y"), t0 + Duration::from_millis(100));
    run_timers_until(&mut player, t0 + Duration::from_millis(249));
    assert!(state_changes(&mut player).is_empty());

    run_timers_until(&mut player, t0 + Duration::from_millis(1000));
    let messages = state_changes(&mut player);
    assert_eq!(messages.len(), 1);
    assert_eq!(
        answers_of(&messages[0]),
        json!([
            {"id": "a", "status": "VALUE_CHANGED", "value": "x"},
            {"id": "b", "status": "VALUE_CHANGED", "value": "y"}
        ])
    );
}

#[test]
fn test_new_unit_cancels_pending_messages() {
    let mut config = Config::immediate();
    config.debounce_state_messages_ms = 150;
    let mut player = Player::new(config);
    let t0 = Instant::now();

    start(&mut player, "<input name='old'>", json!({}), t0);
    start(&mut player, "<input name='new'>", json!({}), t0 + Duration::from_millis(100));
    run_timers_until(&mut player, t0 + Duration::from_millis(1000));

    let messages = state_changes(&mut player);
    assert_eq!(messages.len(), 1);
    assert_eq!(answers_of(&messages[0])[0]["id"], "new");
}

// ========== 会话 ==========

#[test]
fn test_commands_for_other_sessions_are_ignored() {
    let mut player = started(
        "<fieldset><input name='a'></fieldset><fieldset><input name='b'></fieldset>",
        json!({"pagingMode": "separate"}),
    );
    send(&mut player, json!({"type": "vopStopCommand", "sessionId": "1"}));
    run_timers_until(&mut player, Instant::now() + Duration::from_secs(5));
    player.take_outbox();
    let ui_before = player.ui_state();
    let state_before = player.current_unit_state();

    for command in [
        json!({"type": "vopStopCommand", "sessionId": "2"}),
        json!({"type": "vopContinueCommand", "sessionId": "2"}),
        json!({"type": "vopPageNavigationCommand", "sessionId": "2", "target": "2"}),
        json!({
            "type": "vopPlayerConfigChangedNotification",
            "sessionId": "2",
            "playerConfig": {"pagingMode": "concat-scroll", "stateReportPolicy": "on-demand"}
        }),
        json!({
            "type": "vopNavigationDeniedNotification",
            "sessionId": "2",
            "reason": ["responsesIncomplete", "presentationIncomplete"]
        }),
        json!({"type": "vopGetStateRequest", "sessionId": "2", "stop": true}),
    ] {
        send(&mut player, command);
    }
    run_timers_until(&mut player, Instant::now() + Duration::from_secs(5));

    assert!(player.take_outbox().is_empty());
    assert!(player.session().is_stopped());
    assert_eq!(player.ui_state(), ui_before);
    assert_eq!(player.current_unit_state(), state_before);

    send(&mut player, json!({"type": "vopGetStateRequest", "sessionId": 1}));
    assert!(matches!(
        player.take_outbox().as_slice(),
        [Notification::GetStateResponse(_)]
    ));
}

#[test]
fn test_malformed_known_command_is_reported() {
    let mut player = Player::new(Config::immediate());
    send(
        &mut player,
        json!({"type": "vopStartCommand", "sessionId": "1", "unitDefinition": 42}),
    );
    assert_eq!(runtime_error_code(&mut player).as_deref(), Some("message-malformed"));
    assert!(player.unit().is_none());

    start(&mut player, "<input name='a'>", json!({}), Instant::now());
    player.take_outbox();
    send(
        &mut player,
        json!({"type": "vopGetStateRequest", "sessionId": "1", "stop": "yes"}),
    );
    assert_eq!(runtime_error_code(&mut player).as_deref(), Some("message-malformed"));
    assert!(player.session().is_running());
}

#[test]
fn test_garbage_messages_are_dropped() {
    let mut player = started("<input name='a'>", json!({}));
    player.take_outbox();
    player.handle_message("{{ not json", Instant::now());
    send(&mut player, json!({"type": "somethingElse", "sessionId": "1"}));
    assert!(player.take_outbox().is_empty());
    assert!(player.session().is_running());
}

// ========== 版本与单元定义 ==========

#[test]
fn test_missing_unit_definition_is_reported_first() {
    let mut player = Player::new(Config::immediate());
    send(
        &mut player,
        json!({
            "type": "vopStartCommand",
            "sessionId": "1",
            "unitDefinitionType": "item-player@9.0",
            "unitState": {"unitStateDataType": "crazy-format-1.0"}
        }),
    );
    assert_eq!(runtime_error_code(&mut player).as_deref(), Some("unit-definition-missing"));
    assert!(player.unit().is_none());
    assert_eq!(player.session().session_id(), None);
}

#[test]
fn test_unsupported_versions_are_refused() {
    let mut player = Player::new(Config::immediate());
    send(
        &mut player,
        json!({
            "type": "vopStartCommand",
            "sessionId": "1",
            "unitDefinition": "<input>",
            "unitDefinitionType": "item-player@9.0",
        }),
    );
    assert_eq!(
        runtime_error_code(&mut player).as_deref(),
        Some("unit-definition-type-unsupported")
    );

    send(
        &mut player,
        json!({
            "type": "vopStartCommand",
            "sessionId": "1",
            "unitDefinition": "<input>",
            "unitState": {"unitStateDataType": "iqb-standard@10.0.0"}
        }),
    );
    assert_eq!(
        runtime_error_code(&mut player).as_deref(),
        Some("unit-state-type-unsupported")
    );
    assert!(player.unit().is_none());
}

#[test]
fn test_refused_start_keeps_previous_unit() {
    let mut player = started("<input name='a'>", json!({}));
    player.take_outbox();
    send(
        &mut player,
        json!({"type": "vopStartCommand", "sessionId": "2", "unitDefinition": "<p></p>", "unitDefinitionType": "binary"}),
    );
    assert_eq!(player.session().session_id(), Some("1"));
    assert_eq!(player.unit().unwrap().registry().len(), 1);
}

// ========== 分页 ==========

#[test]
fn test_separate_mode_is_driven_by_the_host() {
    let mut player = started(
        "<fieldset><input name='a'></fieldset><fieldset><input name='b'></fieldset>",
        json!({"pagingMode": "separate"}),
    );
    let first = state_changes(&mut player);
    assert_eq!(
        first[0].unit_state.as_ref().unwrap().presentation_progress,
        PresentationProgress::Some
    );
    assert!(!player.ui_state().page_nav.visible);

    ui(&mut player, UiAction::NextPage);
    assert_eq!(player.ui_state().visible_pages, vec![0]);

    send(&mut player, json!({"type": "vopPageNavigationCommand", "sessionId": "1", "target": "2"}));
    assert_eq!(player.ui_state().visible_pages, vec![1]);
    let messages = state_changes(&mut player);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].player_state.as_ref().unwrap().current_page, "2");
    assert_eq!(
        messages[0].unit_state.as_ref().unwrap().presentation_progress,
        PresentationProgress::Complete
    );

    send(&mut player, json!({"type": "vopPageNavigationCommand", "sessionId": "1", "target": "3"}));
    assert!(state_changes(&mut player).is_empty());
}

#[test]
fn test_snap_scrolling_counts_skipped_pages() {
    let definition = "<fieldset data-height='1000'>1</fieldset>\
                      <fieldset data-height='1000'>2</fieldset>\
                      <fieldset data-height='1000'>3</fieldset>";
    let mut snap = started(definition, json!({"pagingMode": "concat-scroll-snap"}));
    let mut plain = started(definition, json!({"pagingMode": "concat-scroll"}));

    for player in [&mut snap, &mut plain] {
        ui(player, UiAction::Resize { viewport_height: 500.0 });
        ui(player, UiAction::Scroll { top: 2500.0 });
        assert_eq!(player.ui_state().current_page, Some(2));
    }
    let progress = |player: &mut Player| player.current_unit_state().unwrap().presentation_progress;
    assert_eq!(progress(&mut snap), PresentationProgress::Complete);
    assert_eq!(progress(&mut plain), PresentationProgress::Some);
}

#[test]
fn test_host_geometry_updates_coverage() {
    let mut player = started(
        "<fieldset data-height='2000'><input name='a' data-offset='1800'></fieldset>",
        json!({"pagingMode": "buttons"}),
    );
    let first = state_changes(&mut player);
    assert_eq!(
        first[0].unit_state.as_ref().unwrap().presentation_progress,
        PresentationProgress::Some
    );
    assert_eq!(answers_of(&first[0])[0]["status"], "NOT_REACHED");

    // 宿主渲染器排版完成后更新视口，再让播放器处理积累的事件
    player.unit_mut().unwrap().dom_mut().set_viewport_height(2500.0);
    player.sync_unit(Instant::now());
    let messages = state_changes(&mut player);
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].unit_state.as_ref().unwrap().presentation_progress,
        PresentationProgress::Complete
    );
    assert_eq!(answers_of(&messages[0])[0]["status"], "DISPLAYED");
}

// ========== 导航拒绝 ==========

#[test]
fn test_responses_incomplete_points_at_each_field() {
    let mut player = started(
        "<fieldset data-height='3000'><input name='num' type='number' id='numberField'></fieldset>\
         <fieldset><input type='text' name='req' required id='requiredField'></fieldset>",
        json!({"pagingMode": "buttons"}),
    );
    ui(&mut player, UiAction::type_text(Target::id("numberField"), "Not a number!"));
    assert!(player.ui_state().message_box.is_none());

    send(
        &mut player,
        json!({"type": "vopNavigationDeniedNotification", "sessionId": "1", "reason": ["responsesIncomplete"]}),
    );
    let message_box = player.ui_state().message_box.unwrap();
    assert_eq!(message_box.entries.len(), 2);
    assert!(message_box.entries[0].text.contains("num"));
    assert!(message_box.entries[1].text.contains("is required"));

    ui(&mut player, UiAction::FollowMessage(0));
    let state = player.ui_state();
    assert_eq!(state.visible_pages, vec![0]);
    assert!(matches!(state.pointer, Some(PointerTarget::Control { page: Some(0), .. })));

    ui(&mut player, UiAction::FollowMessage(1));
    let state = player.ui_state();
    assert_eq!(state.visible_pages, vec![1]);
    assert!(matches!(state.pointer, Some(PointerTarget::Control { page: Some(1), .. })));

    ui(&mut player, UiAction::CloseMessage);
    let state = player.ui_state();
    assert!(state.message_box.is_none());
    assert!(state.pointer.is_none());
}

#[test]
fn test_presentation_incomplete_includes_factors() {
    let remaining = Arc::new(AtomicUsize::new(2));
    let mut player = Player::new(Config::immediate());
    let shared = Arc::clone(&remaining);
    player.set_unit_script(move |unit: &mut UnitCtx| {
        let remaining = Arc::clone(&shared);
        unit.extensions_mut()
            .register_factor("special", move || -> AppResult<FactorReport> {
                let missing = remaining.load(Ordering::SeqCst);
                Ok(if missing == 0 {
                    FactorReport::complete()
                } else {
                    FactorReport::pending(vec!["Special Stuff was not visited".to_string(); missing])
                })
            });
        Ok(())
    });
    start(
        &mut player,
        "<fieldset data-height='3000'><input name='a' id='fieldA'></fieldset>\
         <fieldset><input name='b' id='fieldB' required></fieldset>",
        json!({"pagingMode": "buttons"}),
        Instant::now(),
    );

    send(
        &mut player,
        json!({"type": "vopNavigationDeniedNotification", "sessionId": "1", "reason": ["presentationIncomplete"]}),
    );
    // 第一页没滚到底、第二页没看过、两条来自呈现因子
    assert_eq!(player.ui_state().message_box.unwrap().entries.len(), 4);

    remaining.fetch_sub(1, Ordering::SeqCst);
    ui(&mut player, UiAction::ExtensionChanged);
    ui(&mut player, UiAction::NextPage);
    send(
        &mut player,
        json!({
            "type": "vopNavigationDeniedNotification",
            "sessionId": "1",
            "reason": ["presentationIncomplete", "responsesIncomplete"]
        }),
    );
    let entries = player.ui_state().message_box.unwrap().entries;
    assert_eq!(entries.len(), 3);
    assert!(matches!(entries[0].target, PointerTarget::Region { page: Some(0), .. }));
    assert!(matches!(entries[1].target, PointerTarget::Factor { .. }));
    assert!(matches!(entries[2].target, PointerTarget::Control { page: Some(1), .. }));
}

#[test]
fn test_denial_without_open_items_shows_nothing() {
    let mut player = started("<input name='a'>", json!({}));
    send(&mut player, json!({"type": "vopNavigationDeniedNotification", "sessionId": "1"}));
    assert!(player.ui_state().message_box.is_none());
}

// ========== 状态与扩展 ==========

#[test]
fn test_required_number_fields_progress() {
    let mut player = started(
        "<input type='number' name='first' required><input type='number' name='second' required>",
        json!({}),
    );
    let progress = |player: &mut Player| {
        let messages = state_changes(player);
        messages.last().unwrap().unit_state.as_ref().unwrap().response_progress
    };
    assert_eq!(progress(&mut player), ResponseProgress::None);

    ui(&mut player, UiAction::type_text(Target::name("first"), "not a number"));
    assert!(state_changes(&mut player)
        .iter()
        .all(|m| m.unit_state.as_ref().unwrap().response_progress == ResponseProgress::None));

    ui(&mut player, UiAction::type_text(Target::name("second"), "1"));
    assert_eq!(progress(&mut player), ResponseProgress::Some);

    ui(&mut player, UiAction::ClearText { target: Target::name("first") });
    ui(&mut player, UiAction::type_text(Target::name("first"), "1"));
    assert_eq!(progress(&mut player), ResponseProgress::Complete);
}

#[test]
fn test_restored_state_survives_a_round_trip() {
    let mut player = Player::new(Config::immediate());
    send(
        &mut player,
        json!({
            "type": "vopStartCommand",
            "sessionId": "1",
            "unitDefinition": "<fieldset><input name='a' required></fieldset><fieldset><input name='b'></fieldset>",
            "unitState": {
                "dataParts": {
                    "answers": "[{\"id\":\"a\",\"status\":\"VALUE_CHANGED\",\"value\":\"restored\"}]",
                    "special": "{\"value\":1}"
                },
                "presentationProgress": "complete",
                "responseProgress": "some",
                "unitStateDataType": "iqb-standard@1.0"
            },
            "playerConfig": {"pagingMode": "buttons", "stateReportPolicy": "on-demand"}
        }),
    );
    assert!(state_changes(&mut player).is_empty());

    send(&mut player, json!({"type": "vopGetStateRequest", "sessionId": "1"}));
    let outbox = player.take_outbox();
    let Some(Notification::GetStateResponse(response)) = outbox.first() else {
        panic!("expected a GetStateResponse, got {:?}", outbox);
    };
    let unit_state = response.unit_state.as_ref().unwrap();
    assert_eq!(unit_state.presentation_progress, PresentationProgress::Complete);
    assert_eq!(unit_state.response_progress, ResponseProgress::Complete);
    assert_eq!(unit_state.data_parts["special"], "{\"value\":1}");
    assert_eq!(unit_state.unit_state_data_type, "iqb-standard@1.3");
    assert_eq!(
        answers_of(response),
        json!([
            {"id": "a", "status": "VALUE_CHANGED", "value": "restored"},
            {"id": "b", "status": "NOT_REACHED", "value": ""}
        ])
    );
}

#[test]
fn test_collectors_contribute_data_parts() {
    let visits = Arc::new(AtomicUsize::new(0));
    let mut player = Player::new(Config::immediate());
    let shared = Arc::clone(&visits);
    player.set_unit_script(move |unit: &mut UnitCtx| {
        let visits = Arc::clone(&shared);
        unit.extensions_mut()
            .register_collector("special", move || -> AppResult<Value> {
                Ok(json!({"visits": visits.load(Ordering::SeqCst)}))
            })?;
        // 保留键，登记失败
        unit.extensions_mut()
            .register_collector("answers", || -> AppResult<Value> { Ok(json!("x")) })
    });
    start(&mut player, "<input name='a'>", json!({}), Instant::now());

    let first = state_changes(&mut player);
    let parts = &first[0].unit_state.as_ref().unwrap().data_parts;
    assert_eq!(parts["special"], r#"{"visits":0}"#);
    assert!(parts["answers"].starts_with('['));

    visits.store(3, Ordering::SeqCst);
    ui(&mut player, UiAction::ExtensionChanged);
    let messages = state_changes(&mut player);
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].unit_state.as_ref().unwrap().data_parts["special"],
        r#"{"visits":3}"#
    );
    assert!(messages[0].player_state.is_none());
}

#[test]
fn test_log_policies() {
    let kept = |policy: &str| {
        let mut player = started(
            "<input name='a'>",
            json!({"logPolicy": policy, "stateReportPolicy": "on-demand"}),
        );
        for level in [LogLevel::Lean, LogLevel::Rich, LogLevel::Debug] {
            ui(&mut player, UiAction::log(level, format!("{:?}", level)));
        }
        send(&mut player, json!({"type": "vopGetStateRequest", "sessionId": "1"}));
        match player.take_outbox().pop() {
            Some(Notification::GetStateResponse(response)) => response.log.map(|log| log.len()),
            other => panic!("expected a GetStateResponse, got {:?}", other),
        }
    };
    assert_eq!(kept("debug"), Some(3));
    assert_eq!(kept("rich"), Some(2));
    assert_eq!(kept("lean"), Some(1));
    assert_eq!(kept("disabled"), None);
}

#[test]
fn test_log_entries_are_sent_once() {
    let mut player = started("<input name='a'>", json!({}));
    player.take_outbox();
    ui(&mut player, UiAction::log(LogLevel::Lean, "first"));
    let messages = state_changes(&mut player);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].log.as_ref().unwrap()[0].key, "first");
    assert!(messages[0].unit_state.is_none());

    ui(&mut player, UiAction::ExtensionChanged);
    assert!(state_changes(&mut player).is_empty());
}

// ========== 运行循环 ==========

#[tokio::test(start_paused = true)]
async fn test_runtime_over_channel_transport() {
    let (transport, mut host) = ChannelTransport::pair();
    let (runtime, _ui) = Runtime::new(Player::new(Config::immediate()), transport);

    let host_side = async move {
        assert_eq!(host.recv().await.unwrap()["type"], "vopReadyNotification");
        host.send_raw("this is not json").unwrap();
        host.send(&json!({
            "type": "vopStartCommand",
            "sessionId": 7,
            "unitDefinition": "<input name='a' required>",
            "playerConfig": {"unitNumber": 3},
        }))
        .unwrap();
        let started = host.recv().await.unwrap();
        assert_eq!(started["type"], "vopStateChangedNotification");
        assert_eq!(started["sessionId"], "7");
        assert_eq!(started["unitState"]["responseProgress"], "none");

        host.send(&json!({"type": "vopGetStateRequest", "sessionId": "7", "stop": true}))
            .unwrap();
        let response = host.recv().await.unwrap();
        assert_eq!(response["type"], "vopGetStateResponse");
        assert_eq!(response["playerState"]["currentPage"], "");
    };

    let (player, ()) = tokio::join!(runtime.run(), host_side);
    let player = player.unwrap();
    assert!(player.session().is_stopped());
    assert!(player.ui_state().overlay);
    assert_eq!(player.ui_state().unit_info.unit_number.as_deref(), Some("3"));
}
