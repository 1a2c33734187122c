use super::*;
use axum::body::Body;
use axum::http::Request;
use clap::Parser;
use corvax_lab_engine::{GameSnapshot, MachineRecord};
use tower::ServiceExt;

fn temp_store() -> Store {
    let p = std::env::temp_dir().join(format!(
        "corvax-lab-server-test-{}.db",
        time::OffsetDateTime::now_utc().unix_timestamp_nanos()
    ));
    let store = Store::new(p);
    let _ = store.open().expect("open db");
    store
}

fn temp_state() -> (Store, Arc<AppState>) {
    let store = temp_store();
    let state = AppState::load(store.clone(), "p1", EngineConfig::default()).unwrap();
    (store, Arc::new(state))
}

fn seeded_state(machines: Vec<MachineRecord>) -> (Store, Arc<AppState>) {
    let store = temp_store();
    let snapshot = GameSnapshot {
        resources: ResourceLedger::new(500.0, 500.0, 500.0, 500.0),
        machines,
        rooms: RoomState::default(),
    };
    store.save_snapshot("p1", &snapshot, &[]).unwrap();
    let state = AppState::load(store.clone(), "p1", EngineConfig::default()).unwrap();
    (store, Arc::new(state))
}

fn record(id: u64, machine_type: &str, level: u32) -> MachineRecord {
    MachineRecord {
        id,
        machine_type: machine_type.to_string(),
        level,
        x: 0.0,
        y: 0.0,
        room: 1,
        last_activated: 0,
    }
}

fn build(machine_type: &str) -> Json<BuildRequest> {
    Json(BuildRequest {
        machine_type: machine_type.to_string(),
        x: 100.0,
        y: 100.0,
    })
}

#[tokio::test]
async fn build_spends_and_persists() {
    let (store, state) = temp_state();

    let built = api_build(State(state.clone()), build("catsLair"))
        .await
        .unwrap();
    assert_eq!(built.0.machine.level, 1);
    assert_eq!(built.0.name, "Cat's Lair");
    assert!(built.0.can_upgrade);

    let resources = api_resources(State(state.clone())).await;
    assert_eq!(resources.0.amounts.get(ResourceKind::CatNips), 5.0);
    assert_eq!(resources.0.display["catNips"], "5");

    let saved = store.load_snapshot("p1").unwrap().expect("saved");
    assert_eq!(saved.machines.len(), 1);
    assert_eq!(saved.machines[0].machine_type, "catsLair");
    assert_eq!(saved.resources.get(ResourceKind::CatNips), 5.0);
    assert!(store.get_rev("p1").unwrap() > 0);
}

#[tokio::test]
async fn build_unknown_type_is_bad_request() {
    let (_, state) = temp_state();
    let err = api_build(State(state), build("teleporter"))
        .await
        .unwrap_err();
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
    assert_eq!(err.1 .0.kind, ErrorKind::BadRequest);
}

#[tokio::test]
async fn unaffordable_build_reports_missing_amounts() {
    let (store, state) = temp_state();
    let err = api_build(State(state.clone()), build("reactor"))
        .await
        .unwrap_err();

    assert_eq!(err.0, StatusCode::CONFLICT);
    assert_eq!(err.1 .0.kind, ErrorKind::InsufficientResources);
    let missing = err.1 .0.missing.clone().expect("missing amounts");
    assert_eq!(missing.get("tcorvax"), Some(&10.0));
    assert_eq!(missing.get("catNips"), None);

    assert!(api_machines(State(state)).await.0.is_empty());
    assert!(store.load_snapshot("p1").unwrap().is_none());
}

#[tokio::test]
async fn third_reactor_is_gated() {
    let (_, state) = seeded_state(vec![record(1, "reactor", 1), record(2, "reactor", 1)]);
    let err = api_build(State(state.clone()), build("reactor"))
        .await
        .unwrap_err();
    assert_eq!(err.0, StatusCode::CONFLICT);
    assert_eq!(err.1 .0.kind, ErrorKind::BuildNotAllowed);

    let catalog = api_catalog(State(state)).await.0;
    let reactor = catalog
        .iter()
        .find(|e| e.machine_type == MachineType::Reactor)
        .unwrap();
    assert!(!reactor.can_build);
    assert!(reactor.affordable);
    assert_eq!(reactor.owned, 2);
    assert_eq!(reactor.note, Some("Requires Incubator & FOMO HIT"));
}

#[tokio::test]
async fn upgrade_errors_map_to_status() {
    let (_, state) = seeded_state(vec![record(4, "amplifier", 5)]);

    let err = api_upgrade(State(state.clone()), Path(99)).await.unwrap_err();
    assert_eq!(err.0, StatusCode::NOT_FOUND);
    assert_eq!(err.1 .0.kind, ErrorKind::NotFound);

    let err = api_upgrade(State(state.clone()), Path(4)).await.unwrap_err();
    assert_eq!(err.0, StatusCode::CONFLICT);
    assert_eq!(err.1 .0.kind, ErrorKind::MaxLevelReached);

    let machines = api_machines(State(state)).await.0;
    assert!(!machines[0].can_upgrade);
    assert_eq!(machines[0].upgrade_cost, None);
}

#[tokio::test]
async fn upgrade_then_move() {
    let (store, state) = seeded_state(vec![record(1, "reactor", 1)]);

    let upgraded = api_upgrade(State(state.clone()), Path(1)).await.unwrap();
    assert_eq!(upgraded.0.machine.level, 2);
    assert_eq!(upgraded.0.upgrade_label.as_deref(), Some("💎30 🐱30"));

    let moved = api_move(
        State(state.clone()),
        Path(1),
        Json(MoveRequest { x: 42.0, y: 7.5 }),
    )
    .await
    .unwrap();
    assert_eq!((moved.0.machine.x, moved.0.machine.y), (42.0, 7.5));

    let saved = store.load_snapshot("p1").unwrap().unwrap();
    assert_eq!(saved.machines[0].level, 2);
    assert_eq!(saved.machines[0].x, 42.0);
    assert_eq!(saved.resources.get(ResourceKind::TCorvax), 480.0);
}

#[tokio::test]
async fn mint_once_survives_restart() {
    let (store, state) = seeded_state(vec![record(5, "fomoHit", 1)]);

    assert!(api_mint(State(state.clone()), Path(5)).await.0.minted);
    assert!(!api_mint(State(state.clone()), Path(5)).await.0.minted);
    assert!(!api_mint(State(state), Path(77)).await.0.minted);

    let restarted = Arc::new(AppState::load(store, "p1", EngineConfig::default()).unwrap());
    assert!(!api_mint(State(restarted.clone()), Path(5)).await.0.minted);
    let machines = api_machines(State(restarted)).await.0;
    assert!(matches!(machines[0].mint, MintStatus::Minted { .. }));
}

#[tokio::test]
async fn room_navigation_and_notifications() {
    let (store, state) = temp_state();

    let change = api_set_room(State(state.clone()), Json(RoomRequest { room: 2 })).await.0;
    assert!(!change.changed);
    assert_eq!(change.current_room, 1);
    assert_eq!(change.notification, None);

    let change = api_unlock_room(State(state.clone())).await.0;
    assert!(change.changed);
    assert_eq!(change.rooms_unlocked, 2);
    assert_eq!(
        change.notification.map(|n| n.text).as_deref(),
        Some("Room 2 unlocked!")
    );
    assert!(!api_rooms(State(state.clone())).await.0.rooms.unlock_seen());

    let change = api_set_room(State(state.clone()), Json(RoomRequest { room: 2 })).await.0;
    assert!(change.changed);
    assert_eq!(change.current_room, 2);
    assert_eq!(
        change.notification,
        Some(Notification {
            text: "Entered Room 2".to_string(),
            color: "#4CAF50".to_string(),
        })
    );

    let rooms = api_acknowledge_room(State(state.clone())).await.0;
    assert!(rooms.rooms.unlock_seen());

    let saved = store.load_snapshot("p1").unwrap().unwrap();
    assert_eq!(saved.rooms.current_room(), 2);
    assert!(saved.rooms.unlock_seen());
}

#[tokio::test]
async fn machines_belong_to_current_room() {
    let (_, state) = temp_state();
    api_unlock_room(State(state.clone())).await;
    api_build(State(state.clone()), build("catsLair")).await.unwrap();
    api_set_room(State(state.clone()), Json(RoomRequest { room: 2 })).await;

    assert!(api_rooms(State(state.clone())).await.0.machines.is_empty());
    api_set_room(State(state.clone()), Json(RoomRequest { room: 1 })).await;
    assert_eq!(api_rooms(State(state)).await.0.machines, vec![MachineId(1)]);
}

#[tokio::test]
async fn afford_and_credit() {
    let (_, state) = temp_state();
    let cost: Amounts = [("tcorvax".to_string(), 10.0)].into_iter().collect();

    let r = api_afford(State(state.clone()), Json(AffordRequest { cost: cost.clone() }))
        .await
        .unwrap();
    assert!(!r.0.affordable);

    let credited = api_credit(
        State(state.clone()),
        Json(CreditRequest {
            income: [("tcorvax".to_string(), 1500.0)].into_iter().collect(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(credited.0.display["tcorvax"], "1.5K");

    let r = api_afford(State(state.clone()), Json(AffordRequest { cost }))
        .await
        .unwrap();
    assert!(r.0.affordable);

    let err = api_afford(
        State(state),
        Json(AffordRequest {
            cost: [("gold".to_string(), 1.0)].into_iter().collect(),
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn huge_credits_saturate_and_survive_restart() {
    let (store, state) = temp_state();
    for _ in 0..2 {
        api_credit(
            State(state.clone()),
            Json(CreditRequest {
                income: [("tcorvax".to_string(), 1e308)].into_iter().collect(),
            }),
        )
        .await
        .unwrap();
    }

    let resources = api_resources(State(state)).await.0;
    assert_eq!(resources.amounts.get(ResourceKind::TCorvax), f64::MAX);
    let v = serde_json::to_value(&resources).unwrap();
    assert!(v["amounts"]["tcorvax"].is_number());

    let reloaded = AppState::load(store, "p1", EngineConfig::default()).unwrap();
    let resources = api_resources(State(Arc::new(reloaded))).await.0;
    assert_eq!(resources.amounts.get(ResourceKind::TCorvax), f64::MAX);
}

#[tokio::test]
async fn state_rev_matches_latest_commit() {
    let (store, state) = temp_state();
    api_build(State(state.clone()), build("catsLair")).await.unwrap();
    api_unlock_room(State(state.clone())).await;

    let view = api_state(State(state)).await.unwrap().0;
    assert_eq!(view.rev, store.get_rev("p1").unwrap());
    assert_eq!(view.machines.len(), 1);
    assert_eq!(view.rooms.rooms.rooms_unlocked(), 2);
}

#[tokio::test]
async fn exhausted_id_space_blocks_builds() {
    let (_, state) = temp_state();
    state.session().load_initial_state(GameSnapshot {
        resources: ResourceLedger::new(500.0, 500.0, 500.0, 500.0),
        machines: vec![record(u64::MAX - 1, "catsLair", 1)],
        rooms: RoomState::default(),
    });

    let lair = &api_catalog(State(state.clone())).await.0[0];
    assert!(!lair.can_build);
    assert_eq!(lair.blockers, vec!["no machine ids left".to_string()]);
    assert_eq!(lair.note, None);

    let err = api_build(State(state.clone()), build("catsLair")).await.unwrap_err();
    assert_eq!(err.0, StatusCode::CONFLICT);
    let resources = api_resources(State(state)).await.0;
    assert_eq!(resources.amounts.get(ResourceKind::CatNips), 500.0);
}

#[tokio::test]
async fn catalog_lists_every_type_in_order() {
    let (_, state) = temp_state();
    let catalog = api_catalog(State(state)).await.0;

    let types: Vec<_> = catalog.iter().map(|e| e.machine_type).collect();
    assert_eq!(types, MachineType::ALL.to_vec());

    let lair = &catalog[0];
    assert!(lair.can_build && lair.affordable);
    assert_eq!(lair.cost_label, "🐱5");

    let fomo = &catalog[4];
    assert!(fomo.mint_eligible);
    assert!(!fomo.levelable);
    assert_eq!(fomo.blockers.len(), 7);
    assert_eq!(fomo.note, Some("Build all other machines first"));
}

#[tokio::test]
async fn state_view_round_trips_through_json() {
    let (_, state) = seeded_state(vec![record(1, "catLair", 2), record(2, "teleporter", 1)]);
    let view = api_state(State(state)).await.unwrap().0;
    assert_eq!(view.machines.len(), 1);

    let v = serde_json::to_value(&view).unwrap();
    assert_eq!(v["machines"][0]["type"], "catsLair");
    assert_eq!(v["machines"][0]["lastActivated"], 0);
    assert_eq!(v["machines"][0]["mint"]["status"], "notEligible");
    assert_eq!(v["rooms"]["currentRoom"], 1);
    assert_eq!(v["resources"]["amounts"]["catNips"], 500.0);
}

#[tokio::test]
async fn router_serves_routes_and_errors() {
    let store = temp_store();
    let state = AppState::load(store, "p1", EngineConfig::default()).unwrap();
    let app = build_router(state, ServerConfig::default().allowed_origins);

    let res = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(
            Request::post("/api/machines/9/upgrade")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let err: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let res = app
        .oneshot(
            Request::post("/api/machines")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"type":"catsLair","x":1,"y":2}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[test]
fn cors_origin_matching() {
    let allowed = ServerConfig::default().allowed_origins;
    let ok = |s: &'static str| origin_allowed(&HeaderValue::from_static(s), &allowed);
    assert!(ok("http://localhost"));
    assert!(ok("http://localhost:5173"));
    assert!(ok("http://127.0.0.1:39333"));
    assert!(!ok("http://localhost.evil.example"));
    assert!(!ok("https://localhost"));
    assert!(!ok("http://example.com"));

    let pinned = vec!["http://localhost:3000".to_string()];
    assert!(origin_allowed(&HeaderValue::from_static("http://localhost:3000"), &pinned));
    assert!(!origin_allowed(&HeaderValue::from_static("http://localhost:30001"), &pinned));
}

#[test]
fn config_from_yaml_with_engine_section() {
    let config = ServerConfig::from_yaml(
        r#"
bind: 127.0.0.1:4000
player_id: alice
engine:
  max_rooms: 3
  build_ceilings:
    fomoHit: 1
  starting_resources:
    tcorvax: 25
    catNips: 10
"#,
    )
    .unwrap();
    assert_eq!(config.bind.port(), 4000);
    assert_eq!(config.player_id, "alice");
    assert_eq!(config.engine.max_rooms, Some(3));
    assert_eq!(config.engine.build_ceilings.get(&MachineType::FomoHit), Some(&1));
    assert_eq!(config.engine.starting_resources.get(ResourceKind::TCorvax), 25.0);
    assert_eq!(config.engine.starting_resources.get(ResourceKind::Eggs), 0.0);
    assert_eq!(config.allowed_origins, ServerConfig::default().allowed_origins);

    assert!(ServerConfig::from_yaml("port: 1").is_err());
}

#[test]
fn cli_flags_override_config_file() {
    let path = std::env::temp_dir().join(format!(
        "corvax-lab-config-{}.yaml",
        time::OffsetDateTime::now_utc().unix_timestamp_nanos()
    ));
    std::fs::write(&path, "player_id: from-file\ndb_path: /tmp/file.db\n").unwrap();

    let cli = Cli::try_parse_from([
        "corvax-lab-server",
        "--config",
        path.to_str().unwrap(),
        "--player",
        "from-flag",
    ])
    .unwrap();
    let config = cli.resolve().unwrap();
    assert_eq!(config.player_id, "from-flag");
    assert_eq!(config.db_path, std::path::PathBuf::from("/tmp/file.db"));
    assert_eq!(config.bind.port(), config::DEFAULT_PORT);

    let defaults = Cli::default().resolve().unwrap();
    assert!(defaults.db_path.ends_with(".corvax-lab/corvax-lab.db"));
}
