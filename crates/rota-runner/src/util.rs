use chrono::NaiveDate;

pub use rota_storage_sqlite::now_unix;

/// Local calendar date, the default "today" for a tick.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
