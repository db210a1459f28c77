use axum::extract::{Form, State};
use axum::http::{StatusCode, Uri};
use axum::routing::post;
use axum::Router;
use bwconsole::console::{
    next_run_delay, App, Backend, Config, ConsoleError, Controller, HttpBackend, NodeList,
    NodeRole, Outcome, Result, UiState,
};
use bwconsole::dial::{ChangeOutcome, DialEngine, DialField, Direction, LockableField};
use bwconsole::feed::{parse_result, ChartBuffer, Granularity, ParsedResult, Window};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

type Fields = Vec<(String, String)>;
type Route = Arc<dyn Fn(&str, &Fields) -> (StatusCode, String) + Send + Sync>;
type RequestLog = Arc<Mutex<Vec<(String, Fields)>>>;

const CLIENTS: &str = r#"{"all":[{"name":"lo","isdas":"1-ff00_0_111","addr":"127.0.0.1","port":30001}]}"#;
const SERVERS: &str = r#"{"bwtester":[{"name":"local","isdas":"1-ff00_0_112","addr":"127.0.0.2","port":30100}],
    "sensorapp":[{"name":"sensors","isdas":"1-ff00_0_112","addr":"127.0.0.2","port":42003}]}"#;

const BW_OUTPUT: &str = "\
Test parameters:
client->server: 3 seconds, 1000 bytes, 30 packets
server->client: 3 seconds, 1000 bytes, 30 packets
S->C results
Attempted bandwidth: 80000 bps / 0.08 Mbps
Achieved bandwidth: 80000 bps / 0.08 Mbps
Loss rate: 0%
Interarrival time variance: 0ms
Average interarrival time: 100ms
Interarrival time min: 99ms
Interarrival time max: 101ms
C->S results
Attempted bandwidth: 80000 bps / 0.08 Mbps
Achieved bandwidth: 64000 bps / 0.06 Mbps
";

#[derive(Clone)]
struct StandIn {
    route: Route,
    log: RequestLog,
}

/// Test helper: Value of one decoded form field
fn field<'a>(fields: &'a Fields, key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Test helper: Record the form and answer from the route table
async fn handle(
    State(stand_in): State<StandIn>,
    uri: Uri,
    Form(fields): Form<Fields>,
) -> (StatusCode, String) {
    let path = uri.path().to_string();
    stand_in
        .log
        .lock()
        .unwrap()
        .push((path.clone(), fields.clone()));
    (stand_in.route)(&path, &fields)
}

/// Test helper: Serve a backend stand-in on a random port
async fn start_backend(route: Route) -> (SocketAddr, RequestLog) {
    let log = RequestLog::default();
    let app = Router::new()
        .route("/command", post(handle))
        .route("/getnodes", post(handle))
        .with_state(StandIn {
            route,
            log: log.clone(),
        });
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test backend");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, log)
}

fn standard_routes() -> Route {
    Arc::new(|path: &str, fields: &Fields| match path {
        "/getnodes" if field(fields, "node_type") == Some("clients_default") => {
            (StatusCode::OK, CLIENTS.to_string())
        }
        "/getnodes" => (StatusCode::OK, SERVERS.to_string()),
        "/command" if field(fields, "apps") == Some("bwtester") => {
            (StatusCode::OK, BW_OUTPUT.to_string())
        }
        "/command" => (StatusCode::OK, "temperature: 21.5\n".to_string()),
        _ => (StatusCode::NOT_FOUND, "not found".to_string()),
    })
}

fn config_for(addr: SocketAddr) -> Config {
    Config {
        backend: format!("http://{}", addr),
        timeout_ms: 2_000,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_end_to_end_bwtest() -> Result<()> {
    let (addr, log) = start_backend(standard_routes()).await;
    let backend = HttpBackend::new(&config_for(addr))?;
    let mut controller = Controller::new(backend, UiState::new("", 0)?, false);

    controller.load_nodes(None, None).await?;
    let outcome = controller.run_command().await?;

    let Outcome::Bandwidth { result, .. } = outcome else {
        panic!("expected a bandwidth outcome");
    };
    assert_eq!(result.cs.throughput, Some(64_000.0));
    assert_eq!(result.sc.arrival_avg, Some(100.0));
    assert_eq!(result.sc.arrival_max, Some(101.0));
    assert!(result.cs.error.is_none());

    let requests = log.lock().unwrap().clone();
    let paths: Vec<&str> = requests.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(paths, ["/getnodes", "/getnodes", "/command"]);
    // loopback client selects the user server list
    assert_eq!(field(&requests[1].1, "node_type"), Some("servers_user"));
    let form = &requests[2].1;
    assert_eq!(field(form, "ia_cli"), Some("1-ff00:0:111"));
    assert_eq!(field(form, "port_ser"), Some("30100"));
    assert_eq!(field(form, "bw_sc"), Some("-sc=3,1000,30,80000bps"));
    Ok(())
}

#[tokio::test]
async fn test_sensor_command_is_general() -> Result<()> {
    let (addr, log) = start_backend(standard_routes()).await;
    let backend = HttpBackend::new(&config_for(addr))?;
    let mut controller = Controller::new(backend, UiState::new("-h", 0)?, false);

    controller.load_nodes(None, None).await?;
    assert!(controller.switch_tab(App::SensorApp));
    let outcome = controller.run_command().await?;
    assert_eq!(outcome, Outcome::General);
    assert!(controller.state().results().contains("temperature: 21.5"));

    let requests = log.lock().unwrap().clone();
    let form = &requests.last().unwrap().1;
    assert_eq!(field(form, "apps"), Some("sensorapp"));
    assert_eq!(field(form, "addl_opt"), Some("-h"));
    assert!(field(form, "bw_cs").is_none());
    Ok(())
}

#[tokio::test]
async fn test_error_status_is_upstream_violation() -> Result<()> {
    let (addr, _log) = start_backend(Arc::new(|_: &str, _: &Fields| {
        (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string())
    }))
    .await;
    let backend = HttpBackend::new(&config_for(addr))?;

    let err = backend.get_nodes(NodeList::ClientsDefault).await.unwrap_err();
    assert!(matches!(err, ConsoleError::Upstream(_)));
    Ok(())
}

#[tokio::test]
async fn test_missing_server_list_entry() -> Result<()> {
    let (addr, _log) = start_backend(standard_routes()).await;
    let backend = HttpBackend::new(&config_for(addr))?;
    let mut controller = Controller::new(backend, UiState::new("", 0)?, false);

    controller.load_nodes(None, None).await?;
    assert!(controller.switch_tab(App::CamerApp));
    assert!(controller
        .state()
        .nodes()
        .selected(NodeRole::Server, App::CamerApp)
        .is_err());
    assert!(matches!(
        controller.run_command().await,
        Err(ConsoleError::Upstream(_))
    ));
    Ok(())
}

#[test]
fn test_locked_dial_never_recomputed_by_others() {
    let mut engine = DialEngine::new();
    engine.set_lock(Direction::ClientToServer, LockableField::PacketCount);
    let before = engine.dials(Direction::ClientToServer).packets();

    for (field, value) in [
        (DialField::Seconds, 6.0),
        (DialField::Size, 500.0),
        (DialField::Bandwidth, 1.0),
    ] {
        let report = engine.on_field_changed(Direction::ClientToServer, field, value);
        assert!(!matches!(
            report.outcome,
            ChangeOutcome::Updated {
                recomputed: DialField::PacketCount
            }
        ));
        engine.settle();
    }
    assert_eq!(engine.dials(Direction::ClientToServer).packets(), before);
}

#[test]
fn test_engine_write_is_swallowed_once() {
    let mut engine = DialEngine::new();
    engine.write(Direction::ServerToClient, DialField::Size, 1200.0);
    let reports = engine.settle();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_suppressed());
    assert!(!engine.feedback_pending(Direction::ServerToClient, DialField::Size));
    assert_eq!(engine.dials(Direction::ServerToClient).size(), 1200.0);
}

#[test]
fn test_failed_run_is_backfilled_from_dials() {
    let engine = DialEngine::new();
    let result: ParsedResult = parse_result(
        "S->C results\nAttempted bandwidth: 80000 bps\nerr=\"dial timeout\"\n",
        &engine,
    );
    assert_eq!(result.sc.error.as_deref(), Some("err=\"dial timeout\""));
    assert_eq!(result.cs.error.as_deref(), Some("err=\"dial timeout\""));
    assert_eq!(result.cs.bandwidth, Some(80_000.0));
}

#[test]
fn test_chart_window_holds_one_window_of_ticks() {
    let granularity = Granularity::UNFOCUSED;
    let tick_ms = granularity.tick_ms() as i64;
    let mut charts = ChartBuffer::with_window(0, Window::untrimmed(granularity));

    let mut now = 0;
    for _ in 0..100 {
        now += tick_ms;
        charts.tick(now);
    }
    let window = charts.window();
    let series = &charts.chart(Direction::ClientToServer).achieved;
    assert_eq!(series.len(), granularity.ticks() as usize + 1);
    assert!(series
        .points()
        .all(|p| p.time_ms as f64 >= window.floor(now)));
}

#[test]
fn test_continuous_delay() {
    let delay = next_run_delay(3.0, 4.0, 5.0, Duration::from_millis(2_000));
    assert_eq!(delay, Duration::from_millis(3_000));
}
