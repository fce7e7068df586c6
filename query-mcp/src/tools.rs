//! The tool catalogue served by the binary.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::registry::{RegistryError, ToolRegistry};
use crate::schema::{decode_args, schema_for};
use crate::source::{CellValue, Filter, Query, QueryResult, StreamOptions, execute_streaming};
use crate::tool::{ToolCtx, ToolDescriptor, ToolError, ToolHandler};

/// Builds the registry in catalogue order.
pub fn default_registry() -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.insert(descriptor::<NoArgs>(
        "list_tables",
        "List all available tables in the catalogue",
        ListTables,
    ))?;
    registry.insert(descriptor::<QueryAlbumsArgs>(
        "query_albums",
        "Query albums with optional filters",
        QueryAlbums,
    ))?;
    registry.insert(descriptor::<QuerySongsArgs>(
        "query_songs",
        "Query songs with streaming and chart data",
        QuerySongs,
    ))?;
    registry.insert(descriptor::<NoArgs>(
        "analyze_tours",
        "Analyze tour data including revenue and attendance",
        AnalyzeTours,
    ))?;
    registry.insert(descriptor::<StreamingQueryArgs>(
        "streaming_query",
        "Execute a large query with streaming results",
        StreamingQuery,
    ))?;
    Ok(registry)
}

fn descriptor<A: JsonSchema>(
    name: &'static str,
    description: &'static str,
    handler: impl ToolHandler + 'static,
) -> ToolDescriptor {
    ToolDescriptor {
        name,
        description,
        input_schema: schema_for::<A>(),
        handler: Arc::new(handler),
    }
}

fn to_json(result: &QueryResult) -> Result<Value, ToolError> {
    serde_json::to_value(result).map_err(|e| ToolError::Internal(e.to_string()))
}

async fn run(ctx: &ToolCtx, query: Query) -> Result<QueryResult, ToolError> {
    let start = Instant::now();
    let result = ctx.source.execute(&query, &ctx.cancel).await?;
    tracing::info!(%query, rows = result.row_count, elapsed = ?start.elapsed(), "query returned");
    Ok(result)
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

struct ListTables;

#[async_trait]
impl ToolHandler for ListTables {
    async fn call(&self, ctx: &ToolCtx, args: Value) -> Result<Value, ToolError> {
        let NoArgs {} = decode_args(args)?;
        to_json(&run(ctx, Query::ShowTables).await?)
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct QueryAlbumsArgs {
    /// Filter by era (e.g. 'Pop', 'Country', 'Indie Folk').
    #[serde(default)]
    era: Option<String>,
}

struct QueryAlbums;

#[async_trait]
impl ToolHandler for QueryAlbums {
    async fn call(&self, ctx: &ToolCtx, args: Value) -> Result<Value, ToolError> {
        let args: QueryAlbumsArgs = decode_args(args)?;
        let mut query = Query::select("albums");
        if let Some(era) = args.era {
            query = query.filter(Filter::Equals {
                column: "era".into(),
                value: CellValue::Text(era),
            });
        }
        to_json(&run(ctx, query).await?)
    }
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct QuerySongsArgs {
    /// Filter by album ID.
    #[serde(default)]
    album_id: Option<String>,
    /// Minimum streams in millions.
    #[serde(default)]
    min_streams: Option<f64>,
}

struct QuerySongs;

#[async_trait]
impl ToolHandler for QuerySongs {
    async fn call(&self, ctx: &ToolCtx, args: Value) -> Result<Value, ToolError> {
        let args: QuerySongsArgs = decode_args(args)?;
        let mut query = Query::select("songs");
        if let Some(album_id) = args.album_id {
            query = query.filter(Filter::Equals {
                column: "album_id".into(),
                value: CellValue::Text(album_id),
            });
        }
        if let Some(min) = args.min_streams {
            query = query.filter(Filter::AtLeast {
                column: "streams_millions".into(),
                value: min,
            });
        }
        to_json(&run(ctx, query).await?)
    }
}

struct AnalyzeTours;

#[async_trait]
impl ToolHandler for AnalyzeTours {
    async fn call(&self, ctx: &ToolCtx, args: Value) -> Result<Value, ToolError> {
        let NoArgs {} = decode_args(args)?;
        let result = run(ctx, Query::select("tours")).await?;
        let summary = tour_summary(&result);
        let mut out = to_json(&result)?;
        if let Value::Object(map) = &mut out {
            map.insert("summary".into(), summary);
        }
        Ok(out)
    }
}

fn tour_summary(result: &QueryResult) -> Value {
    let col = |name: &str| result.column_index(name);
    let (Some(name), Some(shows), Some(attendance), Some(revenue)) = (
        col("name"),
        col("shows"),
        col("attendance"),
        col("revenue_millions"),
    ) else {
        return Value::Null;
    };
    fn num(row: &[CellValue], i: usize) -> f64 {
        row[i].as_f64().unwrap_or(0.0)
    }

    let total_shows: f64 = result.rows.iter().map(|r| num(r, shows)).sum();
    let total_attendance: f64 = result.rows.iter().map(|r| num(r, attendance)).sum();
    let total_revenue: f64 = result.rows.iter().map(|r| num(r, revenue)).sum();
    let top = result
        .rows
        .iter()
        .max_by(|a, b| num(a, revenue).total_cmp(&num(b, revenue)))
        .and_then(|r| r[name].as_str());

    json!({
        "tours": result.row_count,
        "total_shows": total_shows as i64,
        "total_attendance": total_attendance as i64,
        "total_revenue_millions": total_revenue,
        "top_tour": top,
    })
}

#[derive(Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct StreamingQueryArgs {
    /// Table to query (albums, songs, tours).
    table: String,
    /// Rows per batch; the server default applies when omitted.
    #[serde(default)]
    batch_size: Option<NonZeroUsize>,
}

struct StreamingQuery;

#[async_trait]
impl ToolHandler for StreamingQuery {
    async fn call(&self, ctx: &ToolCtx, args: Value) -> Result<Value, ToolError> {
        let args: StreamingQueryArgs = decode_args(args)?;
        let options = StreamOptions {
            batch_size: args.batch_size.map_or(ctx.stream.batch_size, NonZeroUsize::get),
            ..ctx.stream
        };
        let start = Instant::now();
        let mut batches = execute_streaming(
            ctx.source.clone(),
            Query::select(&args.table),
            options,
            ctx.cancel.clone(),
        );

        let mut batch_count = 0usize;
        let mut total_rows = 0usize;
        while let Some(batch) = batches.next().await {
            let batch = batch.inspect_err(|e| {
                if matches!(e, crate::source::QueryError::Cancelled) {
                    tracing::warn!(table = %args.table, batch_count, "streaming query cancelled");
                }
            })?;
            debug_assert_eq!(batch.sequence, batch_count);
            batch_count += 1;
            total_rows += batch.rows.len();
            tracing::debug!(
                table = %args.table,
                sequence = batch.sequence,
                rows = batch.rows.len(),
                "streaming batch"
            );
        }

        let elapsed = start.elapsed();
        tracing::info!(
            table = %args.table,
            batches = batch_count,
            total_rows,
            ?elapsed,
            "streaming completed"
        );
        Ok(json!({
            "table": args.table,
            "batches": batch_count,
            "total_rows": total_rows,
            "query_time_ms": elapsed.as_millis() as u64,
        }))
    }
}
