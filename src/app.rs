#![cfg(feature = "web")]
//! JSON, CSV and PNG endpoints over a live [`Dashboard`].

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::dashboard::{Dashboard, Summary};
use crate::downloader::{to_csv, to_xlsx};
use crate::error::Error;
use crate::graph::{GraphOptions, render, render_scatter};
use crate::iris::{Feature, IrisFigures, ScatterSeries};
use crate::pivot::ChartData;
use crate::reactive::OutputSet;
use crate::saving::{SavedOutputs, to_bytes};
use crate::table::Metric;

pub struct AppState {
    dashboard: Mutex<Dashboard>,
    iris: Option<IrisFigures>,
}

impl AppState {
    pub fn new(dashboard: Dashboard, iris: Option<IrisFigures>) -> Self {
        AppState {
            dashboard: Mutex::new(dashboard),
            iris,
        }
    }

    // Input updates roll back on failure, so a poisoned lock still guards a
    // consistent dashboard.
    fn dashboard(&self) -> MutexGuard<'_, Dashboard> {
        self.dashboard.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Maps crate errors onto HTTP statuses with a JSON body.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    status: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::UnknownOutput(_) | Error::UnknownInput(_) => StatusCode::NOT_FOUND,
            Error::InvalidMetric(_) | Error::InputType { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            status: "error".to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize, Deserialize)]
struct InputsResponse {
    metric: Metric,
    countries: BTreeSet<String>,
}

#[derive(Deserialize)]
struct MetricUpdate {
    metric: String,
}

#[derive(Deserialize)]
struct CountriesUpdate {
    countries: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct UpdateResponse {
    status: String,
    recomputed: Vec<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/summary", get(get_summary))
        .route("/api/inputs", get(get_inputs))
        .route("/api/inputs/metric", post(update_metric))
        .route("/api/inputs/countries", post(update_countries))
        .route("/api/outputs", get(get_outputs))
        .route("/api/outputs/:name", get(get_output))
        .route("/api/outputs/:name/csv", get(download_csv))
        .route("/api/outputs/:name/xlsx", get(download_xlsx))
        .route("/api/charts/:name", get(chart_png))
        .route("/api/export", get(export_outputs))
        .route("/api/iris", get(get_iris))
        .route("/api/iris/charts/:name", get(iris_chart_png))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(state: AppState, bind: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(Arc::new(state));
    let listener = TcpListener::bind(bind).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn attachment(content_type: &str, filename: String, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from(Bytes::from(bytes)),
    )
        .into_response()
}

fn output_of(state: &AppState, name: &str) -> ApiResult<ChartData> {
    Ok(state.dashboard().output(name)?.clone())
}

async fn get_summary(State(state): State<Arc<AppState>>) -> Json<Summary> {
    Json(state.dashboard().summary())
}

async fn get_inputs(State(state): State<Arc<AppState>>) -> ApiResult<Json<InputsResponse>> {
    let dashboard = state.dashboard();
    Ok(Json(InputsResponse {
        metric: dashboard.metric()?,
        countries: dashboard.countries(),
    }))
}

async fn update_metric(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<MetricUpdate>,
) -> ApiResult<Json<UpdateResponse>> {
    let metric: Metric = payload.metric.parse()?;
    let recomputed = state.dashboard().set_metric(metric)?;
    Ok(Json(UpdateResponse {
        status: "ok".to_string(),
        recomputed,
    }))
}

async fn update_countries(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CountriesUpdate>,
) -> ApiResult<Json<UpdateResponse>> {
    let recomputed = state.dashboard().set_countries(payload.countries)?;
    Ok(Json(UpdateResponse {
        status: "ok".to_string(),
        recomputed,
    }))
}

async fn get_outputs(State(state): State<Arc<AppState>>) -> Json<OutputSet> {
    let outputs = state.dashboard().outputs();
    Json(outputs.as_ref().clone())
}

async fn get_output(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ChartData>> {
    Ok(Json(output_of(&state, &name)?))
}

async fn download_csv(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let csv = to_csv(&output_of(&state, &name)?)?;
    Ok(attachment("text/csv", format!("{}.csv", name), csv.into_bytes()))
}

async fn download_xlsx(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let xlsx = to_xlsx(&output_of(&state, &name)?)?;
    Ok(attachment(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        format!("{}.xlsx", name),
        xlsx,
    ))
}

async fn chart_png(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let data = output_of(&state, &name)?;
    let metric = state.dashboard().metric()?;
    let options = GraphOptions {
        y_label: metric.label().to_string(),
        ..GraphOptions::titled(name.replace('_', " "))
    };
    let png = render(&data, &options)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

async fn export_outputs(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let saved = SavedOutputs::capture(&state.dashboard())?;
    let bytes = to_bytes(&saved)?;
    Ok(attachment("application/gzip", "outputs.bin.gz".to_string(), bytes))
}

fn iris_figures(state: &AppState) -> ApiResult<&IrisFigures> {
    state
        .iris
        .as_ref()
        .ok_or_else(|| ApiError(Error::UnknownOutput("iris".to_string())))
}

async fn get_iris(State(state): State<Arc<AppState>>) -> ApiResult<Json<IrisFigures>> {
    Ok(Json(iris_figures(&state)?.clone()))
}

async fn iris_chart_png(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let figures = iris_figures(&state)?;
    let (series, x, y): (&[ScatterSeries], Feature, Feature) = match name.as_str() {
        "sepal_length_vs_petal_length" => (
            figures.sepal_length_vs_petal_length.as_slice(),
            Feature::SepalLength,
            Feature::PetalLength,
        ),
        "sepal_width_vs_petal_width" => (
            figures.sepal_width_vs_petal_width.as_slice(),
            Feature::SepalWidth,
            Feature::PetalWidth,
        ),
        _ => return Err(ApiError(Error::UnknownOutput(name))),
    };
    let options = GraphOptions {
        title: format!("{} vs {}", x.label(), y.label()),
        x_label: x.label(),
        y_label: y.label(),
        ..GraphOptions::default()
    };
    let png = render_scatter(series, &options)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{LINE_COUNTRY_DAILY, PIE_TOTAL};
    use crate::table::{Observation, Table};
    use axum::http::Request;
    use chrono::NaiveDate;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let day = |d| NaiveDate::from_ymd_opt(2020, 8, d).unwrap();
        let table = Table::new(vec![
            Observation::new("Qatar", "Asia", day(1), 10, 1, 2e6),
            Observation::new("Kuwait", "Asia", day(1), 4, 0, 4e6),
            Observation::new("Italy", "Europe", day(2), 50, 5, 6e7),
        ])
        .unwrap();
        let dashboard = Dashboard::new(table, Metric::CasesPerMillion, ["Qatar".to_string()].into()).unwrap();
        Arc::new(AppState::new(dashboard, None))
    }

    async fn body_of(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    fn post_json(uri: &str, json: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn serves_a_named_output() {
        let response = router(state()).oneshot(get_request(&format!("/api/outputs/{}", PIE_TOTAL))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let data: ChartData = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(data.groups(), vec!["Asia", "Europe"]);
    }

    #[tokio::test]
    async fn unknown_output_is_not_found() {
        let response = router(state()).oneshot(get_request("/api/outputs/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn country_update_replaces_country_outputs() {
        let state = state();
        let response = router(state.clone())
            .oneshot(post_json("/api/inputs/countries", r#"{"countries":["Qatar","Kuwait"]}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let update: UpdateResponse = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(
            update.recomputed,
            vec!["line_country_daily", "line_country_cumsum", "country_case_totals"]
        );

        let groups = state.dashboard().output(LINE_COUNTRY_DAILY).unwrap().groups();
        assert_eq!(groups, vec!["Kuwait", "Qatar"]);
    }

    #[tokio::test]
    async fn bad_metric_is_rejected() {
        let response = router(state())
            .oneshot(post_json("/api/inputs/metric", r#"{"metric":"recoveries"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn csv_download_has_a_header_row() {
        let response = router(state()).oneshot(get_request("/api/outputs/pie_total/csv")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = String::from_utf8(body_of(response).await).unwrap();
        assert!(body.starts_with("label,value\n"));
    }

    #[tokio::test]
    async fn export_is_gzip_and_iris_is_optional() {
        let response = router(state()).oneshot(get_request("/api/export")).await.unwrap();
        assert_eq!(&body_of(response).await[..2], &[0x1f, 0x8b]);

        let response = router(state()).oneshot(get_request("/api/iris")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
