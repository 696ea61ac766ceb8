use b3_api::{Client, CompanyDetailQuery, CompanyListQuery};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn load_fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{}", name)).unwrap()
}

#[tokio::test]
async fn get_initial_companies_success() {
    let mock_server = MockServer::start().await;
    let body = load_fixture("companies.json");

    Mock::given(method("GET"))
        .and(path_regex(
            "^/listedCompaniesProxy/CompanyCall/GetInitialCompanies/.+$",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(&body))
        .mount(&mock_server)
        .await;

    let client = Client::with_base_url(&mock_server.uri());
    let resp = client
        .get_initial_companies(&CompanyListQuery::default().with_page_size(2))
        .await
        .unwrap();
    assert_eq!(resp.results.len(), 2);
    assert_eq!(resp.page.total_pages, 2);
    assert_eq!(resp.results[0].code_cvm, "9512");
    assert_eq!(resp.results[1].issuing_company, "VALE");
}

#[tokio::test]
async fn get_company_detail_success() {
    let mock_server = MockServer::start().await;
    let body = load_fixture("company_detail.json");

    Mock::given(method("GET"))
        .and(path_regex("^/listedCompaniesProxy/CompanyCall/GetDetail/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(&body))
        .mount(&mock_server)
        .await;

    let client = Client::with_base_url(&mock_server.uri());
    let detail = client
        .get_company_detail(&CompanyDetailQuery::new("9512"))
        .await
        .unwrap();
    assert_eq!(detail.code_cvm.as_deref(), Some("9512"));
    assert_eq!(detail.tickers(), vec!["PETR3", "PETR4"]);
    assert_eq!(
        detail.institution_common.as_deref(),
        Some("BANCO BRADESCO S.A.")
    );
}

#[tokio::test]
async fn get_initial_companies_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex("^/listedCompaniesProxy/.*$"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&mock_server)
        .await;

    let client = Client::with_base_url(&mock_server.uri());
    let result = client
        .get_initial_companies(&CompanyListQuery::default())
        .await;
    match result {
        Err(b3_api::Error::HttpStatus { status, body }) => {
            assert_eq!(status, 500);
            assert!(body.contains("Internal Server Error"));
        }
        other => panic!("expected HttpStatus error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn get_company_detail_malformed_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex("^/listedCompaniesProxy/.*$"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not valid json}"))
        .mount(&mock_server)
        .await;

    let client = Client::with_base_url(&mock_server.uri());
    let result = client
        .get_company_detail(&CompanyDetailQuery::new("9512"))
        .await;
    assert!(matches!(result, Err(b3_api::Error::Parse(_))));
}
