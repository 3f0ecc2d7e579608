use pipedag_core::{ConnectionKey, PipelineDocument, RunType, Step, StepId, StepMap, Vec2};
use pipedag_editor::{
    EditorContext, EditorSession, Gesture, Key, KeyEvent, Modifiers, PointerAffordance,
    PointerEvent, WheelDeltaMode, WheelEvent,
};
use pipedag_events::{EditorEvent, EventBus};
use std::time::{Duration, Instant};

// Default initial offset is (-1, -1): canvas point p is drawn at client p - 1.
fn client(x: f64, y: f64) -> Vec2 {
    Vec2::new(x - 1.0, y - 1.0)
}

fn a() -> StepId {
    StepId::from_u128(0xA)
}

fn b() -> StepId {
    StepId::from_u128(0xB)
}

fn document(connected: bool) -> PipelineDocument {
    let mut second = Step::new(b(), "train").with_position(Vec2::new(500.0, 100.0));
    if connected {
        second = second.with_incoming([a()]);
    }
    let steps: StepMap = [
        Step::new(a(), "load").with_position(Vec2::new(100.0, 100.0)),
        second,
    ]
    .into_iter()
    .map(|s| (s.uuid, s))
    .collect();
    PipelineDocument {
        name: "scenarios".to_string(),
        steps,
        ..PipelineDocument::default()
    }
}

fn open(connected: bool, read_only: bool) -> (EditorSession, EventBus) {
    let events = EventBus::new();
    let context = EditorContext {
        events: events.clone(),
        ..EditorContext::default()
    }
    .read_only(read_only);
    let mut session = EditorSession::new(&context);
    session.set_viewport_size(Vec2::new(1200.0, 800.0));
    session.load_document(&document(connected));
    events.drain();
    (session, events)
}

fn click(session: &mut EditorSession, position: Vec2, now: Instant) {
    session
        .pointer_down(PointerEvent::primary(position), now)
        .unwrap();
    session.pointer_up(PointerEvent::primary(position), now).unwrap();
}

#[test]
fn dragging_from_outgoing_handle_connects_steps() {
    let (mut session, _) = open(false, false);
    let now = Instant::now();

    // Right edge of "load", vertically centered.
    session
        .pointer_down(PointerEvent::primary(client(290.0, 152.5)), now)
        .unwrap();
    assert_eq!(session.affordance(), PointerAffordance::Connecting);
    assert!(session.state().new_connection.is_some());

    session
        .pointer_move(PointerEvent::primary(client(550.0, 152.5)))
        .unwrap();
    let pending = session.state().new_connection.as_ref().unwrap();
    assert_eq!(pending.end_position, Some(Vec2::new(550.0, 152.5)));

    session
        .pointer_up(PointerEvent::primary(client(550.0, 152.5)), now)
        .unwrap();
    assert!(session.state().new_connection.is_none());
    assert_eq!(session.state().steps[&b()].incoming_connections, vec![a()]);
    assert_eq!(session.state().connections.len(), 1);
    assert_eq!(session.save_token(), 1);
}

#[test]
fn dropping_a_connection_on_empty_canvas_cancels_it() {
    let (mut session, _) = open(false, false);
    let now = Instant::now();

    session
        .pointer_down(PointerEvent::primary(client(290.0, 152.5)), now)
        .unwrap();
    session
        .pointer_up(PointerEvent::primary(client(400.0, 600.0)), now)
        .unwrap();

    assert!(session.state().new_connection.is_none());
    assert!(session.state().connections.is_empty());
    assert_eq!(session.save_token(), 0);
}

#[test]
fn escape_cancels_a_pending_connection() {
    let (mut session, _) = open(false, false);
    session
        .pointer_down(PointerEvent::primary(client(290.0, 152.5)), Instant::now())
        .unwrap();
    session.key_down(KeyEvent::new(Key::Escape)).unwrap();

    assert!(session.state().new_connection.is_none());
    assert_eq!(session.affordance(), PointerAffordance::Default);
}

#[test]
fn double_click_opens_notebook() {
    let (mut session, events) = open(false, false);
    let t0 = Instant::now();

    click(&mut session, client(150.0, 150.0), t0);
    assert_eq!(session.state().opened_step, Some(a()));
    assert!(session.state().is_selected(&a()));

    click(&mut session, client(150.0, 150.0), t0 + Duration::from_millis(120));
    let received = events.drain();
    assert_eq!(
        received,
        vec![
            EditorEvent::StepOpened { id: Some(a()) },
            EditorEvent::OpenNotebook { id: a() },
        ]
    );
}

#[test]
fn slow_second_click_is_a_single_click() {
    let (mut session, events) = open(false, false);
    let t0 = Instant::now();

    click(&mut session, client(150.0, 150.0), t0);
    click(&mut session, client(150.0, 150.0), t0 + Duration::from_millis(400));

    let received = events.drain();
    assert!(
        received
            .iter()
            .all(|event| !matches!(event, EditorEvent::OpenNotebook { .. }))
    );
    assert_eq!(received.len(), 2);
}

#[test]
fn read_only_double_click_opens_preview() {
    let (mut session, events) = open(false, true);
    let t0 = Instant::now();

    click(&mut session, client(150.0, 150.0), t0);
    click(&mut session, client(150.0, 150.0), t0 + Duration::from_millis(50));

    assert!(events.drain().contains(&EditorEvent::OpenFilePreview { id: a() }));
}

#[test]
fn dragging_steps_moves_them_and_saves_once() {
    let (mut session, _) = open(false, false);
    let now = Instant::now();

    session
        .pointer_down(PointerEvent::primary(client(150.0, 150.0)), now)
        .unwrap();
    session
        .pointer_move(PointerEvent::primary(client(170.0, 160.0)))
        .unwrap();
    session
        .pointer_move(PointerEvent::primary(client(200.0, 170.0)))
        .unwrap();
    assert_eq!(session.save_token(), 0);
    session
        .pointer_up(PointerEvent::primary(client(200.0, 170.0)), now)
        .unwrap();

    assert_eq!(
        session.state().steps[&a()].position(),
        Vec2::new(150.0, 120.0)
    );
    assert_eq!(session.save_token(), 1);
    // A drag is not a click.
    assert_eq!(session.state().opened_step, None);
    assert!(matches!(session.registry().get(&a()), Some(h) if h.bounds.min == Vec2::new(150.0, 120.0)));
}

#[test]
fn dragging_a_selected_step_moves_the_whole_selection() {
    let (mut session, _) = open(false, false);
    session.key_down(KeyEvent::new(Key::Char('a')).with_modifiers(Modifiers::CTRL)).unwrap();
    assert_eq!(session.state().selected_steps.len(), 2);

    let now = Instant::now();
    session
        .pointer_down(PointerEvent::primary(client(550.0, 150.0)), now)
        .unwrap();
    session
        .pointer_move(PointerEvent::primary(client(550.0, 250.0)))
        .unwrap();
    session
        .pointer_up(PointerEvent::primary(client(550.0, 250.0)), now)
        .unwrap();

    assert_eq!(session.state().steps[&a()].position(), Vec2::new(100.0, 200.0));
    assert_eq!(session.state().steps[&b()].position(), Vec2::new(500.0, 200.0));
}

#[test]
fn read_only_drag_does_not_move() {
    let (mut session, _) = open(false, true);
    let now = Instant::now();
    session
        .pointer_down(PointerEvent::primary(client(290.0, 152.5)), now)
        .unwrap();
    assert!(matches!(session.gesture(), Gesture::DraggingSteps { .. }));
    session
        .pointer_move(PointerEvent::primary(client(390.0, 152.5)))
        .unwrap();
    session
        .pointer_up(PointerEvent::primary(client(390.0, 152.5)), now)
        .unwrap();

    assert_eq!(session.state().steps[&a()].position(), Vec2::new(100.0, 100.0));
    assert!(session.state().connections.is_empty());
    assert_eq!(session.save_token(), 0);
}

#[test]
fn box_select_then_click_on_empty_canvas_clears() {
    let (mut session, _) = open(false, false);
    let now = Instant::now();

    session
        .pointer_down(PointerEvent::primary(client(50.0, 50.0)), now)
        .unwrap();
    session
        .pointer_move(PointerEvent::primary(client(520.0, 300.0)))
        .unwrap();
    session
        .pointer_up(PointerEvent::primary(client(520.0, 300.0)), now)
        .unwrap();

    let selected: Vec<_> = session.state().selected_steps.iter().copied().collect();
    assert_eq!(selected, vec![a(), b()]);
    assert!(!session.state().step_selector.active);

    click(&mut session, client(50.0, 600.0), now);
    assert!(session.state().selected_steps.is_empty());
}

#[test]
fn ctrl_click_toggles_selection() {
    let (mut session, _) = open(false, false);
    let now = Instant::now();
    let ctrl_click = |session: &mut EditorSession, at: Vec2| {
        let event = PointerEvent::primary(at).with_modifiers(Modifiers::CTRL);
        session.pointer_down(event, now).unwrap();
        session.pointer_up(event, now).unwrap();
    };

    ctrl_click(&mut session, client(150.0, 150.0));
    ctrl_click(&mut session, client(550.0, 150.0));
    assert_eq!(session.state().selected_steps.len(), 2);
    ctrl_click(&mut session, client(150.0, 150.0));
    let selected: Vec<_> = session.state().selected_steps.iter().copied().collect();
    assert_eq!(selected, vec![b()]);
}

#[test]
fn clicking_a_connection_selects_it_and_delete_removes_it() {
    let (mut session, _) = open(true, false);
    let key = ConnectionKey::new(a(), b());

    click(&mut session, client(395.0, 152.5), Instant::now());
    assert_eq!(session.state().selected_connection, Some(key));
    assert!(session.state().connection(&key).unwrap().selected);

    session.key_down(KeyEvent::new(Key::Delete)).unwrap();
    assert!(session.state().connections.is_empty());
    assert!(session.state().steps[&b()].incoming_connections.is_empty());
    assert_eq!(session.save_token(), 1);
}

#[test]
fn deleting_a_step_drops_its_connections() {
    let (mut session, _) = open(true, false);
    click(&mut session, client(150.0, 150.0), Instant::now());
    session.key_down(KeyEvent::new(Key::Backspace)).unwrap();

    assert!(!session.state().steps.contains_key(&a()));
    assert!(session.state().steps[&b()].incoming_connections.is_empty());
    assert!(session.state().connections.is_empty());
    assert_eq!(session.state().opened_step, None);
    assert_eq!(session.registry().len(), 1);
}

#[test]
fn shortcuts_are_ignored_while_typing() {
    let (mut session, _) = open(true, false);
    click(&mut session, client(150.0, 150.0), Instant::now());
    let mut event = KeyEvent::new(Key::Delete);
    event.input_focused = true;
    session.key_down(event).unwrap();

    assert!(session.state().steps.contains_key(&a()));
}

#[test]
fn ctrl_enter_requests_a_selection_run() {
    let (mut session, events) = open(true, false);
    click(&mut session, client(550.0, 150.0), Instant::now());
    events.drain();

    session
        .key_down(KeyEvent::new(Key::Enter).with_modifiers(Modifiers::CTRL))
        .unwrap();
    assert_eq!(
        events.drain(),
        vec![EditorEvent::RunRequested {
            steps: vec![b()],
            run_type: RunType::Selection,
        }]
    );
    assert!(session.selection_has_external_incoming());
}

#[test]
fn space_drag_pans_the_canvas() {
    let (mut session, _) = open(false, false);
    let now = Instant::now();

    session.key_down(KeyEvent::new(Key::Space)).unwrap();
    assert_eq!(session.affordance(), PointerAffordance::ReadyToPan);

    session
        .pointer_down(PointerEvent::primary(Vec2::new(10.0, 10.0)), now)
        .unwrap();
    assert_eq!(session.affordance(), PointerAffordance::Panning);
    session
        .pointer_move(PointerEvent::primary(Vec2::new(60.0, 30.0)))
        .unwrap();
    session
        .pointer_up(PointerEvent::primary(Vec2::new(60.0, 30.0)), now)
        .unwrap();
    session.key_up(KeyEvent::new(Key::Space)).unwrap();

    assert_eq!(session.viewport().offset, Vec2::new(49.0, 19.0));
    assert_eq!(session.affordance(), PointerAffordance::Default);
    assert_eq!(session.save_token(), 0);
}

#[test]
fn wheel_zoom_keeps_the_point_under_the_cursor() {
    let (mut session, events) = open(false, false);
    let cursor = Vec2::new(400.0, 300.0);
    let before = session.viewport().client_to_canvas(cursor, 1.0);

    session
        .wheel(WheelEvent {
            position: cursor,
            delta_y: 300.0,
            delta_mode: WheelDeltaMode::Pixel,
        })
        .unwrap();

    let scale = session.state().scale_factor;
    assert!((scale - 0.9).abs() < 1e-9);
    let after = session.viewport().client_to_canvas(cursor, scale);
    assert!(before.distance(after) < 1e-9);
    assert!(matches!(events.drain().as_slice(), [EditorEvent::ZoomChanged { .. }]));
}

#[test]
fn zoom_is_clamped_and_h_recenters() {
    let (mut session, events) = open(false, false);
    for _ in 0..20 {
        session.zoom_out().unwrap();
    }
    assert_eq!(session.state().scale_factor, 0.25);

    session.key_down(KeyEvent::new(Key::Char('h'))).unwrap();
    assert_eq!(session.state().scale_factor, 1.0);
    assert_eq!(session.viewport().offset, Vec2::new(-1.0, -1.0));
    assert_eq!(session.viewport().translation, Vec2::ZERO);
    assert!(events.drain().contains(&EditorEvent::CenterView));
}
