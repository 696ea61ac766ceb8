mod meta;
pub use self::meta::{Page, PaginatedResponse};

mod company;
pub use self::company::{CompanyDetail, CompanySummary, OtherCode};
