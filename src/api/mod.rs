use axum::{
    Router,
    extract::{
        Json, Query, RawQuery,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    DEFAULT_END_YEAR, DEFAULT_START_YEAR, Horizon, Inputs, ResultTable, SatisfactionTier,
    TableRow, csi_rates, project, project_with_waves,
};
use crate::error::{CliError, InputError};
use crate::report::{
    CSV_FILE_NAME, Language, csv_string, format_number, parse_number, render_html_table,
    render_text_table,
};

const STYLES_CSS: &str = include_str!("../../web/styles.css");

const CSV_CONTENT_DISPOSITION: &str = "attachment; filename=\"csi_profitability.csv\"";

/// Longest horizon a single request may ask for.
pub const MAX_HORIZON_YEARS: usize = 200;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliLanguage {
    #[value(aliases = ["en"])]
    English,
    #[value(name = "svenska", aliases = ["swedish", "sv"])]
    Swedish,
}

impl From<CliLanguage> for Language {
    fn from(value: CliLanguage) -> Self {
        match value {
            CliLanguage::English => Language::English,
            CliLanguage::Swedish => Language::Swedish,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Csv,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiLanguage {
    #[serde(alias = "en")]
    English,
    #[serde(alias = "svenska", alias = "sv")]
    Swedish,
}

impl From<ApiLanguage> for CliLanguage {
    fn from(value: ApiLanguage) -> Self {
        match value {
            ApiLanguage::English => CliLanguage::English,
            ApiLanguage::Swedish => CliLanguage::Swedish,
        }
    }
}

/// A numeric field as the web form or a JSON client sends it: a plain number
/// or text in either locale's grouping style.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum NumberInput {
    Int(i64),
    Float(f64),
    Text(String),
}

impl NumberInput {
    fn whole<T: TryFrom<i64>>(&self, flag: &'static str) -> Result<T, InputError> {
        let value = match self {
            NumberInput::Int(v) => *v,
            NumberInput::Float(v) if v.is_finite() && v.fract() == 0.0 => *v as i64,
            NumberInput::Float(v) => {
                return Err(InputError::NotANumber {
                    flag,
                    text: v.to_string(),
                });
            }
            NumberInput::Text(text) => parse_number(text, flag)?,
        };
        T::try_from(value).map_err(|_| InputError::OutOfRange {
            flag,
            requirement: "within the supported range",
        })
    }

    fn amount(&self, flag: &'static str) -> Result<f64, InputError> {
        match self {
            NumberInput::Int(v) => Ok(*v as f64),
            NumberInput::Float(v) => Ok(*v),
            NumberInput::Text(text) => parse_number(text, flag).map(|v| v as f64),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectPayload {
    csi_score: Option<NumberInput>,
    sample_size: Option<NumberInput>,
    ownership_years: Option<NumberInput>,
    warranty_years: Option<NumberInput>,
    vehicle_profit: Option<NumberInput>,
    service_profit: Option<NumberInput>,
    start_year: Option<NumberInput>,
    end_year: Option<NumberInput>,
    language: Option<ApiLanguage>,
}

fn parse_amount(text: &str) -> Result<f64, InputError> {
    parse_number(text, "amount").map(|v| v as f64)
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "csi-profit",
    about = "Projects service visits, repeat purchases and profit for a cohort of vehicle buyers from its CSI score"
)]
pub struct Cli {
    #[arg(
        long,
        default_value_t = 870,
        allow_negative_numbers = true,
        help = "CSI score, conventionally out of 1000"
    )]
    csi_score: i32,
    #[arg(
        long,
        default_value_t = 100.0,
        value_parser = parse_amount,
        help = "Initial cohort size; grouping separators (, . and spaces) are ignored"
    )]
    sample_size: f64,
    #[arg(
        long,
        default_value_t = 2,
        help = "Years of ownership before a customer buys again"
    )]
    ownership_years: u32,
    #[arg(
        long,
        default_value_t = 3,
        help = "Warranty length in years; service visits accrue within it"
    )]
    warranty_years: u32,
    #[arg(
        long,
        default_value_t = 1225.0,
        value_parser = parse_amount,
        allow_negative_numbers = true,
        help = "Profit per vehicle sale"
    )]
    vehicle_profit: f64,
    #[arg(
        long,
        default_value_t = 350.0,
        value_parser = parse_amount,
        allow_negative_numbers = true,
        help = "Service profit per customer per year"
    )]
    service_profit: f64,
    #[arg(long, default_value_t = DEFAULT_START_YEAR, allow_negative_numbers = true)]
    start_year: i32,
    #[arg(long, default_value_t = DEFAULT_END_YEAR, allow_negative_numbers = true)]
    end_year: i32,
    #[arg(long, value_enum, default_value_t = CliLanguage::English)]
    language: CliLanguage,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Debug)]
struct ApiRequest {
    inputs: Inputs,
    language: Language,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    csi_score: i32,
    tier: SatisfactionTier,
    service_return_rate: f64,
    repeat_purchase_rate: f64,
    start_year: i32,
    end_year: i32,
    wave_count: usize,
    rows: Vec<TableRow>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn validate_cli(cli: &Cli) -> Result<(), InputError> {
    if !cli.sample_size.is_finite() || cli.sample_size < 0.0 {
        return Err(InputError::OutOfRange {
            flag: "--sample-size",
            requirement: ">= 0",
        });
    }

    for (flag, value) in [
        ("--vehicle-profit", cli.vehicle_profit),
        ("--service-profit", cli.service_profit),
    ] {
        if !value.is_finite() {
            return Err(InputError::OutOfRange {
                flag,
                requirement: "a finite number",
            });
        }
    }

    if cli.ownership_years == 0 {
        return Err(InputError::OutOfRange {
            flag: "--ownership-years",
            requirement: ">= 1",
        });
    }

    if cli.warranty_years == 0 {
        return Err(InputError::OutOfRange {
            flag: "--warranty-years",
            requirement: ">= 1",
        });
    }

    if cli.start_year > cli.end_year {
        return Err(InputError::InvertedHorizon {
            start: cli.start_year,
            end: cli.end_year,
        });
    }

    let years = horizon_from_cli(cli).len();
    if years > MAX_HORIZON_YEARS {
        return Err(InputError::HorizonTooLong {
            years,
            max: MAX_HORIZON_YEARS,
        });
    }

    Ok(())
}

fn horizon_from_cli(cli: &Cli) -> Horizon {
    Horizon {
        start_year: cli.start_year,
        end_year: cli.end_year,
    }
}

fn inputs_from_cli(cli: &Cli) -> Inputs {
    Inputs {
        csi_score: cli.csi_score,
        initial_count: cli.sample_size,
        service_profit: cli.service_profit,
        ownership_years: cli.ownership_years,
        warranty_years: cli.warranty_years,
        vehicle_profit: cli.vehicle_profit,
        horizon: horizon_from_cli(cli),
    }
}

pub fn build_inputs(cli: &Cli) -> Result<Inputs, InputError> {
    validate_cli(cli)?;
    Ok(inputs_from_cli(cli))
}

pub fn run_cli(cli: Cli) -> Result<String, CliError> {
    let inputs = build_inputs(&cli)?;
    let language = Language::from(cli.language);
    let table = project(&inputs);
    log::info!(
        "projected csi={} cohort={} over {}-{}: profit={}",
        inputs.csi_score,
        inputs.initial_count,
        inputs.horizon.start_year,
        inputs.horizon.end_year,
        table.totals.total_profit
    );

    match cli.format {
        OutputFormat::Csv => Ok(csv_string(&table, language)?),
        OutputFormat::Text => Ok(render_cli_text(&inputs, &table, language)),
    }
}

fn render_cli_text(inputs: &Inputs, table: &ResultTable, language: Language) -> String {
    let labels = language.labels();
    let rates = csi_rates(inputs.csi_score);
    let mut out = String::new();
    let _ = writeln!(out, "{}", labels.title);
    let _ = writeln!(
        out,
        "{}: {}  (service {:.0}%, repeat {:.0}%)",
        labels.csi_score,
        format_number(i64::from(inputs.csi_score), language),
        rates.service_return * 100.0,
        rates.repeat_purchase * 100.0
    );
    out.push('\n');
    let _ = writeln!(out, "{}", labels.results);
    out.push_str(&render_text_table(table, language));
    out
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/index.html", get(index_handler))
        .route("/styles.css", get(styles_handler))
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .route(
            "/api/project.csv",
            get(csv_get_handler).post(csv_post_handler),
        )
        .fallback(not_found_handler);

    let listener = bind_listener(addr).await?;
    axum::serve(listener, app).await
}

async fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    log::info!("CSI profit HTTP API listening on http://{local}");
    log::info!("Local access: http://127.0.0.1:{}/", local.port());
    Ok(listener)
}

async fn index_handler(
    query: Result<Query<ProjectPayload>, QueryRejection>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let payload = query
        .map(|Query(payload)| payload)
        .map_err(|rejection| rejection.body_text());
    index_page(payload, &raw_query.unwrap_or_default())
}

/// Renders the form with results, or with the error and whatever the user
/// typed that still parsed.
fn index_page(payload: Result<ProjectPayload, String>, raw_query: &str) -> Response {
    let mut cli = default_cli_for_api();
    let outcome = payload.and_then(|payload| {
        overlay_payload(&mut cli, payload)
            .and_then(|()| build_inputs(&cli))
            .map_err(|err| err.to_string())
    });
    let language = Language::from(cli.language);

    match outcome {
        Ok(inputs) => {
            let table = project(&inputs);
            let page = render_index_page(language, &inputs, Some(&table), None, raw_query);
            with_cache_control(Html(page))
        }
        Err(err) => {
            log::warn!("rejected page request: {err}");
            let page = render_index_page(
                language,
                &inputs_from_cli(&cli),
                None,
                Some(&err),
                raw_query,
            );
            with_cache_control((StatusCode::BAD_REQUEST, Html(page)))
        }
    }
}

async fn styles_handler() -> impl IntoResponse {
    with_cache_control((
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        STYLES_CSS,
    ))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_get_handler(query: Result<Query<ProjectPayload>, QueryRejection>) -> Response {
    match accept_payload(query.map(|Query(payload)| payload)) {
        Ok(payload) => project_handler_impl(payload).await,
        Err(response) => response,
    }
}

async fn project_post_handler(body: Result<Json<ProjectPayload>, JsonRejection>) -> Response {
    match accept_payload(body.map(|Json(payload)| payload)) {
        Ok(payload) => project_handler_impl(payload).await,
        Err(response) => response,
    }
}

async fn csv_get_handler(query: Result<Query<ProjectPayload>, QueryRejection>) -> Response {
    match accept_payload(query.map(|Query(payload)| payload)) {
        Ok(payload) => csv_handler_impl(payload).await,
        Err(response) => response,
    }
}

async fn csv_post_handler(body: Result<Json<ProjectPayload>, JsonRejection>) -> Response {
    match accept_payload(body.map(|Json(payload)| payload)) {
        Ok(payload) => csv_handler_impl(payload).await,
        Err(response) => response,
    }
}

/// Turns an extractor rejection (bad query string, malformed JSON, wrong
/// content type) into the same JSON 400 that validation failures get.
fn accept_payload<E: fmt::Display>(
    extracted: Result<ProjectPayload, E>,
) -> Result<ProjectPayload, Response> {
    extracted.map_err(|rejection| {
        log::warn!("rejected request payload: {rejection}");
        error_response(StatusCode::BAD_REQUEST, &rejection.to_string())
    })
}

async fn project_handler_impl(payload: ProjectPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(err) => {
            log::warn!("rejected projection request: {err}");
            return error_response(StatusCode::BAD_REQUEST, &err.to_string());
        }
    };

    let (table, waves) = project_with_waves(&request.inputs);
    json_response(
        StatusCode::OK,
        build_project_response(&request.inputs, &table, waves.len()),
    )
}

async fn csv_handler_impl(payload: ProjectPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(err) => {
            log::warn!("rejected export request: {err}");
            return error_response(StatusCode::BAD_REQUEST, &err.to_string());
        }
    };

    let table = project(&request.inputs);
    match csv_string(&table, request.language) {
        Ok(body) => with_cache_control((
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, CSV_CONTENT_DISPOSITION),
            ],
            body,
        )),
        Err(err) => {
            log::error!("CSV export failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        }
    }
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload).map_err(|e| e.to_string())
}

fn api_request_from_payload(payload: ProjectPayload) -> Result<ApiRequest, InputError> {
    let mut cli = default_cli_for_api();
    overlay_payload(&mut cli, payload)?;

    let inputs = build_inputs(&cli)?;
    Ok(ApiRequest {
        inputs,
        language: cli.language.into(),
    })
}

/// Copies every field the payload sets onto `cli`. A field that fails to parse
/// leaves its default in place; the others are still applied and the first
/// failure is returned.
fn overlay_payload(cli: &mut Cli, payload: ProjectPayload) -> Result<(), InputError> {
    let mut first_error = None;
    overlay_field(
        &mut cli.csi_score,
        payload.csi_score.map(|v| v.whole("--csi-score")),
        &mut first_error,
    );
    overlay_field(
        &mut cli.sample_size,
        payload.sample_size.map(|v| v.amount("--sample-size")),
        &mut first_error,
    );
    overlay_field(
        &mut cli.ownership_years,
        payload.ownership_years.map(|v| v.whole("--ownership-years")),
        &mut first_error,
    );
    overlay_field(
        &mut cli.warranty_years,
        payload.warranty_years.map(|v| v.whole("--warranty-years")),
        &mut first_error,
    );
    overlay_field(
        &mut cli.vehicle_profit,
        payload.vehicle_profit.map(|v| v.amount("--vehicle-profit")),
        &mut first_error,
    );
    overlay_field(
        &mut cli.service_profit,
        payload.service_profit.map(|v| v.amount("--service-profit")),
        &mut first_error,
    );
    overlay_field(
        &mut cli.start_year,
        payload.start_year.map(|v| v.whole("--start-year")),
        &mut first_error,
    );
    overlay_field(
        &mut cli.end_year,
        payload.end_year.map(|v| v.whole("--end-year")),
        &mut first_error,
    );
    if let Some(v) = payload.language {
        cli.language = v.into();
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn overlay_field<T>(
    slot: &mut T,
    parsed: Option<Result<T, InputError>>,
    first_error: &mut Option<InputError>,
) {
    match parsed {
        Some(Ok(value)) => *slot = value,
        Some(Err(err)) => {
            first_error.get_or_insert(err);
        }
        None => {}
    }
}

fn default_cli_for_api() -> Cli {
    Cli {
        csi_score: 870,
        sample_size: 100.0,
        ownership_years: 2,
        warranty_years: 3,
        vehicle_profit: 1_225.0,
        service_profit: 350.0,
        start_year: DEFAULT_START_YEAR,
        end_year: DEFAULT_END_YEAR,
        language: CliLanguage::English,
        format: OutputFormat::Text,
    }
}

fn build_project_response(
    inputs: &Inputs,
    table: &ResultTable,
    wave_count: usize,
) -> ProjectResponse {
    let rates = csi_rates(inputs.csi_score);
    ProjectResponse {
        csi_score: inputs.csi_score,
        tier: SatisfactionTier::from_score(inputs.csi_score),
        service_return_rate: rates.service_return,
        repeat_purchase_rate: rates.repeat_purchase,
        start_year: inputs.horizon.start_year,
        end_year: inputs.horizon.end_year,
        wave_count,
        rows: table.rows().collect(),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

fn display_amount(value: f64, language: Language) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format_number(value as i64, language)
    } else {
        value.to_string()
    }
}

fn render_index_page(
    language: Language,
    inputs: &Inputs,
    table: Option<&ResultTable>,
    error: Option<&str>,
    raw_query: &str,
) -> String {
    let labels = language.labels();
    let html_lang = match language {
        Language::English => "en",
        Language::Swedish => "sv",
    };

    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html><html lang='{html_lang}'><head><meta charset='utf-8'>\
         <title>{title}</title><link rel='stylesheet' href='/styles.css'></head>\
         <body><div class='block-container'><h1>{title}</h1>",
        title = labels.title
    );

    html.push_str("<form class='inputs' method='get' action='/'>");
    let _ = write!(
        html,
        "<label for='language'>{}</label><select id='language' name='language'>",
        labels.language
    );
    for (option, name) in [
        (Language::English, "English"),
        (Language::Swedish, "Svenska"),
    ] {
        let selected = if option == language { " selected" } else { "" };
        let _ = write!(
            html,
            "<option value='{}'{selected}>{name}</option>",
            option.code()
        );
    }
    html.push_str("</select>");

    let fields = [
        (
            "csiScore",
            labels.csi_score,
            format_number(i64::from(inputs.csi_score), language),
        ),
        (
            "sampleSize",
            labels.sample_size,
            display_amount(inputs.initial_count, language),
        ),
        (
            "ownershipYears",
            labels.ownership_duration,
            format_number(i64::from(inputs.ownership_years), language),
        ),
        (
            "vehicleProfit",
            labels.vehicle_profit,
            display_amount(inputs.vehicle_profit, language),
        ),
        (
            "serviceProfit",
            labels.service_profit,
            display_amount(inputs.service_profit, language),
        ),
        (
            "warrantyYears",
            labels.warranty_duration,
            format_number(i64::from(inputs.warranty_years), language),
        ),
    ];
    for (name, label, value) in fields {
        let _ = write!(
            html,
            "<label for='{name}'>{label}</label>\
             <input id='{name}' name='{name}' type='text' value='{}'>",
            escape_html(&value)
        );
    }
    let _ = write!(
        html,
        "<input type='hidden' name='startYear' value='{}'>\
         <input type='hidden' name='endYear' value='{}'>\
         <button type='submit'>{}</button></form>",
        inputs.horizon.start_year, inputs.horizon.end_year, labels.run
    );

    if let Some(error) = error {
        let _ = write!(html, "<p class='error'>{}</p>", escape_html(error));
    }

    if let Some(table) = table {
        let _ = write!(html, "<h2>{}</h2>", labels.results);
        html.push_str(&render_html_table(table, language));
        let _ = write!(
            html,
            "<a class='download' href='/api/project.csv?{}' download='{CSV_FILE_NAME}'>{}</a>",
            escape_html(raw_query),
            labels.download
        );
    }

    html.push_str("</div></body></html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{Request, Uri};
    use std::fs;
    use std::path::Path;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_cli() -> Cli {
        default_cli_for_api()
    }

    fn assert_golden_snapshot(path: &str, actual: &str) {
        let update = matches!(
            std::env::var("UPDATE_GOLDEN").as_deref(),
            Ok("1") | Ok("true") | Ok("TRUE")
        );
        let snapshot_path = Path::new(path);

        if update {
            if let Some(parent) = snapshot_path.parent() {
                fs::create_dir_all(parent).expect("failed to create snapshot directory");
            }
            fs::write(snapshot_path, actual).expect("failed to write golden snapshot");
            return;
        }

        let expected = fs::read_to_string(snapshot_path).unwrap_or_else(|_| {
            panic!("missing golden snapshot at {path}; run with UPDATE_GOLDEN=1 to generate")
        });
        assert_eq!(
            actual, expected,
            "snapshot mismatch for {path}; run with UPDATE_GOLDEN=1 to refresh if expected"
        );
    }

    #[test]
    fn build_inputs_maps_defaults() {
        let inputs = build_inputs(&sample_cli()).expect("valid inputs");
        assert_eq!(inputs.csi_score, 870);
        assert_approx(inputs.initial_count, 100.0);
        assert_approx(inputs.service_profit, 350.0);
        assert_approx(inputs.vehicle_profit, 1_225.0);
        assert_eq!(inputs.ownership_years, 2);
        assert_eq!(inputs.warranty_years, 3);
        assert_eq!(inputs.horizon, Horizon::default());
    }

    #[test]
    fn build_inputs_rejects_zero_durations() {
        let mut cli = sample_cli();
        cli.warranty_years = 0;
        let err = build_inputs(&cli).expect_err("must reject zero warranty");
        assert!(err.to_string().contains("--warranty-years"));

        let mut cli = sample_cli();
        cli.ownership_years = 0;
        let err = build_inputs(&cli).expect_err("must reject zero ownership");
        assert!(err.to_string().contains("--ownership-years"));
    }

    #[test]
    fn build_inputs_rejects_negative_or_non_finite_cohort() {
        let mut cli = sample_cli();
        cli.sample_size = -1.0;
        let err = build_inputs(&cli).expect_err("must reject negative cohort");
        assert!(err.to_string().contains("--sample-size"));

        cli.sample_size = f64::NAN;
        assert!(build_inputs(&cli).is_err());
    }

    #[test]
    fn build_inputs_rejects_non_finite_profit() {
        let mut cli = sample_cli();
        cli.service_profit = f64::INFINITY;
        let err = build_inputs(&cli).expect_err("must reject infinite profit");
        assert!(err.to_string().contains("--service-profit"));
    }

    #[test]
    fn build_inputs_rejects_inverted_and_overlong_horizons() {
        let mut cli = sample_cli();
        cli.start_year = 2041;
        let err = build_inputs(&cli).expect_err("must reject inverted horizon");
        assert!(err.to_string().contains("--start-year"));

        let mut cli = sample_cli();
        cli.end_year = cli.start_year + MAX_HORIZON_YEARS as i32;
        let err = build_inputs(&cli).expect_err("must reject overlong horizon");
        assert!(matches!(err, InputError::HorizonTooLong { .. }));
    }

    #[test]
    fn build_inputs_accepts_scores_outside_nominal_range() {
        let mut cli = sample_cli();
        cli.csi_score = -40;
        assert!(build_inputs(&cli).is_ok());
        cli.csi_score = 1_400;
        assert!(build_inputs(&cli).is_ok());
    }

    #[test]
    fn cli_parses_locale_amounts_and_language_aliases() {
        let cli = Cli::try_parse_from([
            "csi-profit",
            "--sample-size",
            "1 000",
            "--vehicle-profit",
            "1,225",
            "--csi-score",
            "-20",
            "--language",
            "swedish",
            "--format",
            "csv",
        ])
        .expect("cli should parse");

        assert_approx(cli.sample_size, 1_000.0);
        assert_approx(cli.vehicle_profit, 1_225.0);
        assert_eq!(cli.csi_score, -20);
        assert_eq!(cli.language, CliLanguage::Swedish);
        assert_eq!(cli.format, OutputFormat::Csv);
    }

    #[test]
    fn cli_defaults_match_api_defaults() {
        let cli = Cli::try_parse_from(["csi-profit"]).expect("cli should parse");
        let parsed = build_inputs(&cli).expect("valid inputs");
        let defaults = build_inputs(&default_cli_for_api()).expect("valid inputs");
        assert_eq!(parsed.csi_score, defaults.csi_score);
        assert_approx(parsed.initial_count, defaults.initial_count);
        assert_approx(parsed.vehicle_profit, defaults.vehicle_profit);
        assert_approx(parsed.service_profit, defaults.service_profit);
        assert_eq!(parsed.ownership_years, defaults.ownership_years);
        assert_eq!(parsed.warranty_years, defaults.warranty_years);
        assert_eq!(parsed.horizon, defaults.horizon);
    }

    #[test]
    fn api_request_from_json_parses_web_keys() {
        let json = r#"{
          "csiScore": 910,
          "sampleSize": "1 250",
          "ownershipYears": 3,
          "warrantyYears": "4",
          "vehicleProfit": "1,500",
          "serviceProfit": 420.5,
          "startYear": 2030,
          "endYear": 2034,
          "language": "svenska"
        }"#;
        let request = api_request_from_json(json).expect("json should parse");
        let inputs = request.inputs;

        assert_eq!(inputs.csi_score, 910);
        assert_approx(inputs.initial_count, 1_250.0);
        assert_eq!(inputs.ownership_years, 3);
        assert_eq!(inputs.warranty_years, 4);
        assert_approx(inputs.vehicle_profit, 1_500.0);
        assert_approx(inputs.service_profit, 420.5);
        assert_eq!(
            inputs.horizon,
            Horizon {
                start_year: 2030,
                end_year: 2034
            }
        );
        assert_eq!(request.language, Language::Swedish);
    }

    #[test]
    fn api_request_from_json_falls_back_to_defaults() {
        let request = api_request_from_json("{}").expect("json should parse");
        assert_eq!(request.inputs.csi_score, 870);
        assert_eq!(request.inputs.horizon, Horizon::default());
        assert_eq!(request.language, Language::English);
    }

    #[test]
    fn api_request_from_json_rejects_fractional_and_negative_years() {
        let err = api_request_from_json(r#"{"warrantyYears": 2.5}"#)
            .expect_err("must reject fractional warranty");
        assert!(err.contains("--warranty-years"));

        let err = api_request_from_json(r#"{"ownershipYears": -1}"#)
            .expect_err("must reject negative ownership");
        assert!(err.contains("--ownership-years"));

        let err = api_request_from_json(r#"{"csiScore": "high"}"#)
            .expect_err("must reject non-numeric score");
        assert!(err.contains("--csi-score"));
    }

    #[test]
    fn project_response_serialization_contains_expected_fields() {
        let inputs = build_inputs(&sample_cli()).expect("valid inputs");
        let (table, waves) = project_with_waves(&inputs);
        let response = build_project_response(&inputs, &table, waves.len());
        let json = serde_json::to_string(&response).expect("response should serialize");

        assert!(json.contains("\"tier\":\"good\""));
        assert!(json.contains("\"serviceReturnRate\":0.51"));
        assert!(json.contains("\"repeatPurchaseRate\":0.24"));
        assert!(json.contains("\"waveCount\":8"));
        assert!(json.contains(
            "\"rows\":[{\"label\":\"Total\",\"serviceCustomers\":201,\"repeatPurchases\":31,\"totalProfit\":108325}"
        ));
        assert!(json.contains(
            "{\"label\":2027,\"serviceCustomers\":51,\"repeatPurchases\":24,\"totalProfit\":47250}"
        ));
    }

    #[test]
    fn run_cli_text_output_shows_results_table() {
        let output = run_cli(sample_cli()).expect("cli run");
        assert!(output.starts_with("CSI Profitability Simulator\n"));
        assert!(output.contains("(service 51%, repeat 24%)"));
        assert!(output.contains("108,325"));
    }

    #[test]
    fn run_cli_reports_invalid_inputs() {
        let mut cli = sample_cli();
        cli.warranty_years = 0;
        let err = run_cli(cli).expect_err("must reject invalid inputs");
        assert!(matches!(err, CliError::Input(_)));
    }

    #[test]
    fn index_page_escapes_query_and_marks_selected_language() {
        let inputs = build_inputs(&sample_cli()).expect("valid inputs");
        let table = project(&inputs);
        let page = render_index_page(
            Language::Swedish,
            &inputs,
            Some(&table),
            None,
            "language=svenska&csiScore=870'",
        );

        assert!(page.contains("<option value='svenska' selected>Svenska</option>"));
        assert!(page.contains("value='1 225'"));
        assert!(page.contains("href='/api/project.csv?language=svenska&amp;csiScore=870&#39;'"));
        assert!(page.contains("<tr class='total-row'>"));
        assert!(page.contains("Ladda ner CSV"));
    }

    #[test]
    fn index_page_shows_error_without_table() {
        let inputs = inputs_from_cli(&sample_cli());
        let page = render_index_page(
            Language::English,
            &inputs,
            None,
            Some("--warranty-years must be >= 1"),
            "",
        );
        assert!(page.contains("<p class='error'>--warranty-years must be &gt;= 1</p>"));
        assert!(!page.contains("<table"));
    }

    fn query_payload(uri: &str) -> Result<ProjectPayload, QueryRejection> {
        let uri = uri.parse::<Uri>().expect("valid uri");
        Query::<ProjectPayload>::try_from_uri(&uri).map(|Query(payload)| payload)
    }

    fn header_value<'a>(response: &'a Response, name: header::HeaderName) -> &'a str {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    async fn read_body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        String::from_utf8(bytes.to_vec()).expect("utf-8 body")
    }

    #[tokio::test]
    async fn undecodable_query_returns_json_400_with_no_store() {
        let response = accept_payload(query_payload("/api/project?language=klingon"))
            .expect_err("unknown language must be rejected");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(header_value(&response, header::CONTENT_TYPE).starts_with("application/json"));
        assert_eq!(header_value(&response, header::CACHE_CONTROL), "no-store");

        let body: serde_json::Value =
            serde_json::from_str(&read_body(response).await).expect("json error body");
        let message = body["error"].as_str().expect("error message");
        assert!(message.contains("Failed to deserialize query string"));
    }

    #[tokio::test]
    async fn malformed_json_body_returns_json_400_with_no_store() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/project")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"csiScore": "#))
            .expect("valid request");
        let extracted = Json::<ProjectPayload>::from_request(request, &())
            .await
            .map(|Json(payload)| payload);
        let response = accept_payload(extracted).expect_err("truncated JSON must be rejected");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(header_value(&response, header::CACHE_CONTROL), "no-store");
        let body: serde_json::Value =
            serde_json::from_str(&read_body(response).await).expect("json error body");
        assert!(body["error"].is_string());
    }

    #[test]
    fn locale_query_string_decodes_into_payload() {
        let payload = accept_payload(query_payload(
            "/api/project?sampleSize=1%20250&language=svenska",
        ))
        .expect("valid query");
        let request = api_request_from_payload(payload).expect("valid inputs");

        assert_approx(request.inputs.initial_count, 1_250.0);
        assert_eq!(request.language, Language::Swedish);
    }

    #[tokio::test]
    async fn index_page_renders_error_page_for_undecodable_query() {
        let payload = query_payload("/?language=klingon").map_err(|r| r.body_text());
        let response = index_page(payload, "language=klingon");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(header_value(&response, header::CONTENT_TYPE).starts_with("text/html"));
        assert_eq!(header_value(&response, header::CACHE_CONTROL), "no-store");

        let page = read_body(response).await;
        assert!(page.contains("<p class='error'>Failed to deserialize query string"));
        assert!(page.contains("value='870'"));
        assert!(!page.contains("<table"));
    }

    #[tokio::test]
    async fn index_page_error_keeps_values_the_user_entered() {
        let payload = query_payload(
            "/?csiScore=910&sampleSize=250&warrantyYears=0&language=svenska",
        )
        .map_err(|r| r.body_text());
        let response = index_page(payload, "");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let page = read_body(response).await;
        assert!(page.contains("<html lang='sv'>"));
        assert!(page.contains("id='csiScore' name='csiScore' type='text' value='910'"));
        assert!(page.contains("id='sampleSize' name='sampleSize' type='text' value='250'"));
        assert!(page.contains("id='warrantyYears' name='warrantyYears' type='text' value='0'"));
        assert!(page.contains("--warranty-years must be &gt;= 1"));
    }

    #[test]
    fn overlay_applies_parsed_fields_and_reports_first_failure() {
        let payload = query_payload("/?csiScore=abc&sampleSize=250&endYear=x&ownershipYears=4")
            .expect("decodable query");
        let mut cli = default_cli_for_api();
        let err = overlay_payload(&mut cli, payload).expect_err("bad score");

        assert!(err.to_string().starts_with("--csi-score"));
        assert_eq!(cli.csi_score, 870);
        assert_approx(cli.sample_size, 250.0);
        assert_eq!(cli.ownership_years, 4);
        assert_eq!(cli.end_year, DEFAULT_END_YEAR);
    }

    #[tokio::test]
    async fn bind_listener_reports_the_bound_port() {
        let listener = bind_listener(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .expect("bind ephemeral port");
        let local = listener.local_addr().expect("local address");
        assert_ne!(local.port(), 0);
    }

    #[test]
    fn csv_disposition_names_export_file() {
        assert!(CSV_CONTENT_DISPOSITION.contains(CSV_FILE_NAME));
    }

    #[test]
    fn golden_snapshot_default_projection_csv() {
        let mut cli = sample_cli();
        cli.format = OutputFormat::Csv;
        let csv = run_cli(cli).expect("cli run");
        assert_golden_snapshot("tests/golden/default_projection_en.csv", &csv);
    }

    #[test]
    fn golden_snapshot_default_projection_swedish_csv() {
        let mut cli = sample_cli();
        cli.format = OutputFormat::Csv;
        cli.language = CliLanguage::Swedish;
        let csv = run_cli(cli).expect("cli run");
        assert_golden_snapshot("tests/golden/default_projection_sv.csv", &csv);
    }
}
