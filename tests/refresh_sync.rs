use countries_core::{
    ConnectivityStatus, CoreConfig, CountriesCore, DetailUiState, ListUiState, ShellConnectivity,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn payload() -> serde_json::Value {
    serde_json::json!([
        {
            "name": { "common": "Spain", "official": "Kingdom of Spain" },
            "cca2": "ES",
            "cca3": "ESP",
            "capital": ["Madrid"],
            "currencies": { "EUR": { "name": "Euro", "symbol": "€" } },
            "flags": { "png": "https://flagcdn.com/w320/es.png", "svg": "https://flagcdn.com/es.svg" }
        },
        {
            "name": { "common": "Armenia", "official": "Republic of Armenia" },
            "cca2": "AM",
            "cca3": "ARM",
            "capital": ["Yerevan"],
            "currencies": { "AMD": { "name": "Armenian dram", "symbol": "֏" } },
            "flags": { "svg": "https://flagcdn.com/am.svg" }
        }
    ])
}

async fn wait_until<S: Clone>(rx: &mut watch::Receiver<S>, done: impl FnMut(&S) -> bool) -> S {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(done))
        .await
        .expect("state did not settle in time")
        .expect("engine dropped")
        .clone()
}

fn open_core(server: &MockServer, connectivity: Arc<ShellConnectivity>) -> CountriesCore {
    let config = CoreConfig {
        base_url: format!("{}/", server.uri()),
        query_debounce_ms: 10,
        ..CoreConfig::default()
    };
    CountriesCore::open(config, connectivity).unwrap()
}

#[tokio::test]
async fn startup_refresh_fills_list_and_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3.1/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload()))
        .expect(1)
        .mount(&server)
        .await;

    let core = open_core(&server, Arc::new(ShellConnectivity::new(true)));
    let list = core.list_engine();
    let mut rx = list.subscribe();

    let state = wait_until(&mut rx, |s: &ListUiState| s.items.len() == 2 && !s.is_loading).await;
    let names: Vec<_> = state.items.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, ["Armenia", "Spain"]);
    assert_eq!(state.items[0].flag_url.as_deref(), Some("https://flagcdn.com/am.svg"));
    assert_eq!(state.error_message, None);

    let details = core.details_engine();
    let mut detail_rx = details.subscribe();
    details.load("ESP");
    let detail = wait_until(&mut detail_rx, |s: &DetailUiState| s.detail.country_name.is_some()).await;
    assert_eq!(detail.detail.capital_name.as_deref(), Some("Madrid"));
    assert_eq!(detail.detail.country_currencies.as_deref(), Some("Euro (€)"));
    assert_eq!(detail.detail.country_flag.as_deref(), Some("https://flagcdn.com/w320/es.png"));
}

#[tokio::test]
async fn failed_refresh_keeps_cache_and_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3.1/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v3.1/all"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let core = open_core(&server, Arc::new(ShellConnectivity::new(true)));
    let list = core.list_engine();
    let mut rx = list.subscribe();
    wait_until(&mut rx, |s: &ListUiState| s.items.len() == 2).await;

    list.refresh();
    let state = wait_until(&mut rx, |s: &ListUiState| s.error_message.is_some()).await;
    assert_eq!(state.error_message.as_deref(), Some("HTTP 500"));
    assert!(!state.is_loading);
    assert_eq!(state.items.len(), 2);
    assert_eq!(list.metrics().refresh_failures, 1);
}

#[tokio::test]
async fn reconnect_triggers_refresh_against_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3.1/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload()))
        .expect(2)
        .mount(&server)
        .await;

    let connectivity = Arc::new(ShellConnectivity::new(true));
    let core = open_core(&server, connectivity.clone());
    let list = core.list_engine();
    let mut rx = list.subscribe();
    wait_until(&mut rx, |s: &ListUiState| s.items.len() == 2).await;

    connectivity.set_online(false);
    wait_until(&mut rx, |s: &ListUiState| s.connectivity_status == ConnectivityStatus::Offline).await;

    connectivity.set_online(true);
    wait_until(&mut rx, |s: &ListUiState| s.connectivity_status == ConnectivityStatus::Online).await;

    for _ in 0..100 {
        if list.metrics().refreshes == 2 && server.received_requests().await.map_or(0, |r| r.len()) == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(list.metrics().refreshes, 2);
}

#[tokio::test]
async fn quick_blip_triggers_refresh_against_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3.1/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload()))
        .expect(2)
        .mount(&server)
        .await;

    let connectivity = Arc::new(ShellConnectivity::new(true));
    let core = open_core(&server, connectivity.clone());
    let list = core.list_engine();
    let mut rx = list.subscribe();
    wait_until(&mut rx, |s: &ListUiState| s.items.len() == 2 && !s.is_loading).await;

    connectivity.set_online(false);
    connectivity.set_online(true);

    for _ in 0..100 {
        if list.metrics().refreshes == 2 && server.received_requests().await.map_or(0, |r| r.len()) == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(list.metrics().refreshes, 2);
    assert_eq!(list.state().connectivity_status, ConnectivityStatus::Online);
}

#[tokio::test]
async fn search_after_refresh_reads_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v3.1/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload()))
        .mount(&server)
        .await;

    let core = open_core(&server, Arc::new(ShellConnectivity::new(true)));
    let repository = core.repository();
    repository.refresh().await.unwrap();

    let found = repository.search("ARM").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].capital.as_deref(), Some("Yerevan"));
}
