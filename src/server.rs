//! Read-only HTTP API over the enriched and aggregated tables.

use crate::config::DataPaths;
use crate::constants::{
    COL_AMOUNT, COL_CATEGORY, COL_LEGAL_NAME, COL_MEAN, COL_QUARTER, COL_REGION, COL_STDDEV, COL_TAX_ID, COL_TOTAL,
    COL_YEAR,
};
use crate::error::{PipelineError, Result};
use crate::pipeline::table::{self, cell, parse_number, Table};
use crate::types::Aggregate;
use axum::{
    extract::{Path, Query},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Extension, Router,
};
use hyper::Server;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::path::Path as FsPath;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

const DEFAULT_PAGE: i64 = 1;
const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;
const TOP_N: usize = 5;

/// One enriched line as the API sees it; text fields are trimmed.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub cnpj: String,
    pub legal_name: String,
    pub category: String,
    pub region: String,
    pub year: Option<i32>,
    pub quarter: Option<u8>,
    pub amount: Option<f64>,
}

/// Tables loaded once at startup and shared read-only by every handler.
#[derive(Debug, Default)]
pub struct ApiState {
    pub records: Vec<EnrichedRecord>,
    pub aggregates: Vec<Aggregate>,
}

fn optional_text(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl ApiState {
    pub fn from_tables(enriched: &Table, aggregated: &Table) -> Result<Self> {
        let tax = enriched.require(COL_TAX_ID, "enriched")?;
        let name = enriched.require(COL_LEGAL_NAME, "enriched")?;
        let category = enriched.column(COL_CATEGORY);
        let region = enriched.require(COL_REGION, "enriched")?;
        let year = enriched.require(COL_YEAR, "enriched")?;
        let quarter = enriched.require(COL_QUARTER, "enriched")?;
        let amount = enriched.require(COL_AMOUNT, "enriched")?;

        let records = enriched
            .rows
            .iter()
            .map(|row| EnrichedRecord {
                cnpj: cell(row, tax).trim().to_string(),
                legal_name: cell(row, name).trim().to_string(),
                category: category.map(|c| cell(row, c).trim().to_string()).unwrap_or_default(),
                region: cell(row, region).trim().to_string(),
                year: parse_number(cell(row, year)).map(|v| v as i32),
                quarter: parse_number(cell(row, quarter)).map(|v| v as u8),
                amount: parse_number(cell(row, amount)),
            })
            .collect();

        let agg_name = aggregated.require(COL_LEGAL_NAME, "aggregated")?;
        let agg_region = aggregated.require(COL_REGION, "aggregated")?;
        let total = aggregated.require(COL_TOTAL, "aggregated")?;
        let mean = aggregated.require(COL_MEAN, "aggregated")?;
        let stddev = aggregated.require(COL_STDDEV, "aggregated")?;

        let aggregates = aggregated
            .rows
            .iter()
            .map(|row| Aggregate {
                legal_name: cell(row, agg_name).trim().to_string(),
                region: cell(row, agg_region).trim().to_string(),
                total: parse_number(cell(row, total)).unwrap_or(0.0),
                mean: parse_number(cell(row, mean)).unwrap_or(f64::NAN),
                stddev: parse_number(cell(row, stddev)),
            })
            .collect();

        Ok(Self { records, aggregates })
    }

    /// Load the enriched and aggregated CSVs. Either missing is fatal.
    pub fn load(paths: &DataPaths) -> Result<Self> {
        let enriched = read_required(&paths.enriched())?;
        let aggregated = read_required(&paths.aggregated())?;
        let state = Self::from_tables(&enriched, &aggregated)?;
        info!(
            records = state.records.len(),
            aggregates = state.aggregates.len(),
            "API data loaded"
        );
        Ok(state)
    }

    fn records_for<'a>(&'a self, cnpj: &'a str) -> impl Iterator<Item = &'a EnrichedRecord> + 'a {
        self.records.iter().filter(move |r| r.cnpj == cnpj)
    }

    fn aggregate_for(&self, legal_name: &str, region: &str) -> Option<&Aggregate> {
        self.aggregates
            .iter()
            .find(|a| a.legal_name == legal_name && a.region == region)
    }
}

fn read_required(path: &FsPath) -> Result<Table> {
    if !path.is_file() {
        return Err(PipelineError::format(path, "file not found, run the pipeline first"));
    }
    table::read_stage_csv(path)
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct OperatorSummary {
    pub cnpj: String,
    pub razao_social: String,
    pub modalidade: Option<String>,
    pub uf: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct OperatorDetail {
    pub cnpj: String,
    pub razao_social: String,
    pub modalidade: Option<String>,
    pub uf: Option<String>,
    pub total_despesas: f64,
    pub media_despesas: Option<f64>,
    pub desvio_padrao_despesas: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ExpenseItem {
    pub ano: i32,
    pub trimestre: u8,
    pub valor_despesas: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Statistics {
    pub total_despesas: f64,
    pub media_despesas: f64,
    pub top5_operadoras: Vec<OperatorDetail>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Page {
    pub data: Vec<OperatorSummary>,
    pub page: i64,
    pub limit: i64,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub busca: Option<String>,
}

/// Error body: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: "Operadora não encontrada".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "detail": self.detail }))).into_response()
    }
}

fn non_finite_as_none(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn detail(cnpj: String, legal_name: &str, category: &str, region: &str, aggregate: Option<&Aggregate>) -> OperatorDetail {
    OperatorDetail {
        cnpj,
        razao_social: legal_name.to_string(),
        modalidade: optional_text(category),
        uf: optional_text(region),
        total_despesas: aggregate.map(|a| a.total).unwrap_or(0.0),
        media_despesas: aggregate.and_then(|a| non_finite_as_none(a.mean)),
        desvio_padrao_despesas: aggregate.and_then(|a| a.stddev),
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "ans-pipeline-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn list_operators(
    Extension(state): Extension<Arc<ApiState>>,
    Query(params): Query<ListParams>,
) -> std::result::Result<Json<Page>, ApiError> {
    let page = params.page.unwrap_or(DEFAULT_PAGE);
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if page < 1 {
        return Err(ApiError::bad_request("page must be >= 1"));
    }
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::bad_request(format!("limit must be between 1 and {MAX_LIMIT}")));
    }

    let distinct: BTreeSet<(&str, &str, &str, &str)> = state
        .records
        .iter()
        .map(|r| (r.cnpj.as_str(), r.legal_name.as_str(), r.category.as_str(), r.region.as_str()))
        .collect();

    let needle = params.busca.as_deref().map(str::to_lowercase).filter(|s| !s.is_empty());
    let matching: Vec<_> = distinct
        .into_iter()
        .filter(|(cnpj, name, _, _)| match &needle {
            Some(n) => cnpj.to_lowercase().contains(n) || name.to_lowercase().contains(n),
            None => true,
        })
        .collect();

    let offset = (page - 1)
        .checked_mul(limit)
        .and_then(|o| usize::try_from(o).ok())
        .ok_or_else(|| ApiError::bad_request("page is out of range"))?;
    let data = matching
        .iter()
        .skip(offset)
        .take(limit as usize)
        .map(|(cnpj, name, category, region)| OperatorSummary {
            cnpj: cnpj.to_string(),
            razao_social: name.to_string(),
            modalidade: optional_text(category),
            uf: optional_text(region),
        })
        .collect();

    Ok(Json(Page {
        data,
        page,
        limit,
        total: matching.len(),
    }))
}

async fn operator_detail(
    Extension(state): Extension<Arc<ApiState>>,
    Path(cnpj): Path<String>,
) -> std::result::Result<Json<OperatorDetail>, ApiError> {
    let cnpj = cnpj.trim();
    let base = state.records_for(cnpj).next().ok_or_else(ApiError::not_found)?;
    let aggregate = state.aggregate_for(&base.legal_name, &base.region);
    Ok(Json(detail(
        cnpj.to_string(),
        &base.legal_name,
        &base.category,
        &base.region,
        aggregate,
    )))
}

async fn operator_expenses(
    Extension(state): Extension<Arc<ApiState>>,
    Path(cnpj): Path<String>,
) -> std::result::Result<Json<Vec<ExpenseItem>>, ApiError> {
    let cnpj = cnpj.trim();
    let mut records = state.records_for(cnpj).peekable();
    if records.peek().is_none() {
        return Err(ApiError::not_found());
    }

    let mut by_period: BTreeMap<(i32, u8), f64> = BTreeMap::new();
    for record in records {
        if let (Some(year), Some(quarter)) = (record.year, record.quarter) {
            *by_period.entry((year, quarter)).or_default() += record.amount.unwrap_or(0.0);
        }
    }

    Ok(Json(
        by_period
            .into_iter()
            .map(|((ano, trimestre), valor_despesas)| ExpenseItem {
                ano,
                trimestre,
                valor_despesas,
            })
            .collect(),
    ))
}

async fn statistics(Extension(state): Extension<Arc<ApiState>>) -> Json<Statistics> {
    let amounts: Vec<f64> = state.records.iter().filter_map(|r| r.amount).collect();
    let total: f64 = amounts.iter().sum();
    let mean = if amounts.is_empty() { 0.0 } else { total / amounts.len() as f64 };

    let mut ranked: Vec<&Aggregate> = state.aggregates.iter().collect();
    ranked.sort_by(|a, b| b.total.total_cmp(&a.total));

    let top = ranked
        .into_iter()
        .take(TOP_N)
        .map(|a| {
            let representative = state
                .records
                .iter()
                .find(|r| r.legal_name == a.legal_name && r.region == a.region);
            let (cnpj, category) = representative
                .map(|r| (r.cnpj.clone(), r.category.as_str()))
                .unwrap_or_default();
            detail(cnpj, &a.legal_name, category, &a.region, Some(a))
        })
        .collect();

    Json(Statistics {
        total_despesas: total,
        media_despesas: mean,
        top5_operadoras: top,
    })
}

/// Build the router with every route and the shared state.
pub fn create_server(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/operadoras", get(list_operators))
        .route("/api/operadoras/:cnpj", get(operator_detail))
        .route("/api/operadoras/:cnpj/despesas", get(operator_expenses))
        .route("/api/estatisticas", get(statistics))
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Serve the API on `port` until the process is stopped.
pub async fn start_server(state: Arc<ApiState>, port: u16) -> Result<()> {
    let app = create_server(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server running on http://localhost:{port}");
    info!("Health check: http://localhost:{port}/health");

    Server::bind(&addr).serve(app.into_make_service()).await?;
    Ok(())
}
