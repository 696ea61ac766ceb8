use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page_number: i64,
    pub page_size: i64,
    pub total_records: i64,
    pub total_pages: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PaginatedResponse<T> {
    pub page: Page,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}
