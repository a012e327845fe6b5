use crate::domain::bar::Bar;
use crate::domain::error::BacklabError;
use chrono::NaiveDate;

/// Inbound market-data boundary. Adapters translate a concrete store (CSV
/// directory, future database) into date-ordered bars.
pub trait DataPort {
    /// Fetch the bars for one security inside `[start, end]`, ordered by
    /// date. An unavailable security is an error, an available one with no
    /// bars in range is an empty vector.
    fn fetch_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, BacklabError>;

    /// Every security this source can serve, sorted.
    fn list_symbols(&self) -> Result<Vec<String>, BacklabError>;
}
