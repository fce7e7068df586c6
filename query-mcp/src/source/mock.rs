use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{CellValue, Query, QueryError, QueryResult, QuerySource, Row};

pub const ALBUM_COLUMNS: &[&str] = &["id", "title", "release_year", "era", "sales_millions", "genre"];
pub const SONG_COLUMNS: &[&str] = &[
    "id",
    "album_id",
    "title",
    "duration_seconds",
    "streams_millions",
    "chart_peak",
    "grammy_nominations",
];
pub const TOUR_COLUMNS: &[&str] = &["id", "name", "year", "shows", "attendance", "revenue_millions"];

/// In-memory catalogue of albums, songs and tours.
///
/// Tables are built once and only read afterwards, so a single instance can
/// serve any number of concurrent queries. Every query waits `latency` before
/// answering to stand in for a network round trip.
pub struct MockSource {
    latency: Duration,
    albums: Vec<Row>,
    songs: Vec<Row>,
    tours: Vec<Row>,
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl MockSource {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            albums: albums(),
            songs: songs(),
            tours: tours(),
        }
    }

    fn table(&self, name: &str) -> Option<(&'static [&'static str], &[Row])> {
        match name.trim().to_ascii_lowercase().as_str() {
            "albums" => Some((ALBUM_COLUMNS, &self.albums)),
            "songs" => Some((SONG_COLUMNS, &self.songs)),
            "tours" => Some((TOUR_COLUMNS, &self.tours)),
            _ => None,
        }
    }

    fn evaluate(&self, query: &Query, cancel: &CancellationToken) -> Result<QueryResult, QueryError> {
        let (table, filters) = match query {
            Query::ShowTables => {
                let rows = self.tables().into_iter().map(|t| vec![CellValue::Text(t)]).collect();
                return Ok(QueryResult::new(&["table_name"], rows));
            }
            Query::Select { table, filters } => (table, filters),
        };
        let (columns, source_rows) = self
            .table(table)
            .ok_or_else(|| QueryError::Unsupported(query.to_string()))?;

        let mut predicates = Vec::with_capacity(filters.len());
        for filter in filters {
            let idx = columns
                .iter()
                .position(|c| *c == filter.column())
                .ok_or_else(|| QueryError::Unsupported(query.to_string()))?;
            predicates.push((idx, filter));
        }

        let mut rows = Vec::with_capacity(source_rows.len());
        for row in source_rows {
            if cancel.is_cancelled() {
                return Err(QueryError::Cancelled);
            }
            if predicates.iter().all(|(idx, f)| f.matches(&row[*idx])) {
                rows.push(row.clone());
            }
        }
        Ok(QueryResult::new(columns, rows))
    }
}

#[async_trait]
impl QuerySource for MockSource {
    async fn execute(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, QueryError> {
        let start = Instant::now();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(QueryError::Cancelled),
            _ = tokio::time::sleep(self.latency) => {}
        }
        let mut result = self.evaluate(query, cancel)?;
        result.query_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(%query, rows = result.row_count, "query executed");
        Ok(result)
    }

    fn tables(&self) -> Vec<String> {
        vec!["albums".into(), "songs".into(), "tours".into()]
    }
}

fn album(id: &str, title: &str, year: i64, era: &str, sales: i64, genre: &str) -> Row {
    vec![id.into(), title.into(), year.into(), era.into(), sales.into(), genre.into()]
}

fn song(id: &str, album_id: &str, title: &str, secs: i64, streams: i64, peak: i64, noms: i64) -> Row {
    vec![
        id.into(),
        album_id.into(),
        title.into(),
        secs.into(),
        streams.into(),
        peak.into(),
        noms.into(),
    ]
}

fn tour(id: &str, name: &str, year: i64, shows: i64, attendance: i64, revenue: f64) -> Row {
    vec![id.into(), name.into(), year.into(), shows.into(), attendance.into(), revenue.into()]
}

fn albums() -> Vec<Row> {
    vec![
        album("ALB001", "Taylor Swift", 2006, "Country", 5, "Country"),
        album("ALB002", "Fearless", 2008, "Country", 12, "Country Pop"),
        album("ALB003", "Speak Now", 2010, "Country Pop", 6, "Country Pop"),
        album("ALB004", "Red", 2012, "Country Pop", 7, "Pop Rock"),
        album("ALB005", "1989", 2014, "Pop", 10, "Synth Pop"),
        album("ALB006", "Reputation", 2017, "Pop", 4, "Electropop"),
        album("ALB007", "Lover", 2019, "Pop", 3, "Pop"),
        album("ALB008", "Folklore", 2020, "Indie Folk", 3, "Indie Folk"),
        album("ALB009", "Evermore", 2020, "Indie Folk", 2, "Alternative"),
        album("ALB010", "Midnights", 2022, "Synth Pop", 6, "Synth Pop"),
        album("ALB011", "The Tortured Poets Department", 2024, "Alternative", 4, "Alternative Pop"),
    ]
}

fn songs() -> Vec<Row> {
    vec![
        song("SONG001", "ALB002", "Love Story", 236, 1800, 4, 0),
        song("SONG002", "ALB002", "You Belong With Me", 232, 1500, 2, 1),
        song("SONG003", "ALB004", "We Are Never Getting Back Together", 193, 1200, 1, 0),
        song("SONG004", "ALB004", "I Knew You Were Trouble", 219, 1400, 2, 1),
        song("SONG005", "ALB005", "Shake It Off", 219, 3200, 1, 3),
        song("SONG006", "ALB005", "Blank Space", 231, 3000, 1, 2),
        song("SONG007", "ALB005", "Style", 231, 1100, 6, 0),
        song("SONG008", "ALB006", "Look What You Made Me Do", 211, 1600, 1, 0),
        song("SONG009", "ALB007", "ME!", 193, 900, 2, 0),
        song("SONG010", "ALB008", "Cardigan", 239, 800, 1, 1),
        song("SONG011", "ALB008", "Exile", 284, 700, 6, 1),
        song("SONG012", "ALB009", "Willow", 214, 600, 1, 0),
        song("SONG013", "ALB010", "Anti-Hero", 200, 2100, 1, 6),
        song("SONG014", "ALB010", "Lavender Haze", 202, 900, 2, 0),
        song("SONG015", "ALB011", "Fortnight", 228, 1100, 1, 0),
        song("SONG016", "ALB005", "Bad Blood", 211, 800, 1, 1),
        song("SONG017", "ALB005", "Wildest Dreams", 220, 1300, 5, 0),
        song("SONG018", "ALB006", "Delicate", 232, 750, 12, 0),
        song("SONG019", "ALB007", "Lover", 221, 850, 10, 0),
        song("SONG020", "ALB008", "The 1", 210, 500, 27, 0),
    ]
}

fn tours() -> Vec<Row> {
    vec![
        tour("TOUR001", "Fearless Tour", 2009, 118, 1_200_000, 63.5),
        tour("TOUR002", "Speak Now World Tour", 2011, 111, 1_600_000, 123.0),
        tour("TOUR003", "The Red Tour", 2013, 86, 1_700_000, 150.2),
        tour("TOUR004", "The 1989 World Tour", 2015, 85, 2_278_647, 250.7),
        tour("TOUR005", "Reputation Stadium Tour", 2018, 53, 2_888_892, 345.7),
        tour("TOUR006", "The Eras Tour", 2023, 152, 10_000_000, 2000.0),
    ]
}
