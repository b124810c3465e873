//! Admin HTTP routes
//!
//! - `GET /tasks` - every task with its live-trigger flag
//! - `POST /tasks` - create a task
//! - `POST /tasks/:id/run` - run a task now
//! - `POST /tasks/:id/pause` / `POST /tasks/:id/resume`
//! - `PUT /tasks/:id/schedule` - change expression and timezone
//! - `DELETE /tasks/:id` - delete a task and its history
//! - `GET /tasks/:id/executions?page=&page_size=` - execution history
//! - `GET /executions/:id/log` - log content for one execution
//! - `GET /health` - liveness
//!
//! Every response body is an [`Envelope`].

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::error::{SchedulerError, SchedulerResult};
use crate::models::{
    Envelope, ExecutionPage, LogContent, NewTask, RunReport, ScheduleUpdate, TaskDefinition,
    TaskStatusView,
};
use crate::scheduler::Scheduler;

/// Create the admin router
pub fn admin_router(scheduler: Arc<Scheduler>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/:id", delete(delete_task))
        .route("/tasks/:id/run", post(run_task))
        .route("/tasks/:id/pause", post(pause_task))
        .route("/tasks/:id/resume", post(resume_task))
        .route("/tasks/:id/schedule", put(update_schedule))
        .route("/tasks/:id/executions", get(list_executions))
        .route("/executions/:id/log", get(read_log))
        .layer(TraceLayer::new_for_http())
        .with_state(scheduler)
}

// ========== Request Types ==========

/// Pagination for execution history
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

// ========== Handlers ==========

async fn health() -> impl IntoResponse {
    Json(Envelope::ok(
        "ok",
        serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }),
    ))
}

async fn list_tasks(
    State(scheduler): State<Arc<Scheduler>>,
) -> SchedulerResult<Json<Envelope<Vec<TaskStatusView>>>> {
    let tasks = scheduler.list_status().await?;
    let message = format!("{} tasks", tasks.len());
    Ok(Json(Envelope::ok(message, tasks)))
}

async fn create_task(
    State(scheduler): State<Arc<Scheduler>>,
    Json(task): Json<NewTask>,
) -> SchedulerResult<(StatusCode, Json<Envelope<TaskDefinition>>)> {
    let created = scheduler.create(task).await?;
    let message = format!("task {} created", created.id);
    Ok((StatusCode::CREATED, Json(Envelope::ok(message, created))))
}

async fn run_task(
    State(scheduler): State<Arc<Scheduler>>,
    Path(id): Path<String>,
) -> SchedulerResult<Json<Envelope<RunReport>>> {
    let report = scheduler.run_now(&id).await?;
    Ok(Json(Envelope {
        success: report.success,
        message: report.message.clone(),
        data: Some(report),
    }))
}

async fn pause_task(
    State(scheduler): State<Arc<Scheduler>>,
    Path(id): Path<String>,
) -> SchedulerResult<Json<Envelope<TaskDefinition>>> {
    let task = scheduler.pause(&id).await?;
    Ok(Json(Envelope::ok(format!("task {} paused", id), task)))
}

async fn resume_task(
    State(scheduler): State<Arc<Scheduler>>,
    Path(id): Path<String>,
) -> SchedulerResult<Json<Envelope<TaskDefinition>>> {
    let task = scheduler.resume(&id).await?;
    Ok(Json(Envelope::ok(format!("task {} resumed", id), task)))
}

async fn update_schedule(
    State(scheduler): State<Arc<Scheduler>>,
    Path(id): Path<String>,
    Json(update): Json<ScheduleUpdate>,
) -> SchedulerResult<Json<Envelope<TaskDefinition>>> {
    let task = scheduler
        .update_schedule(&id, &update.expression, &update.timezone)
        .await?;
    Ok(Json(Envelope::ok(format!("task {} rescheduled", id), task)))
}

async fn delete_task(
    State(scheduler): State<Arc<Scheduler>>,
    Path(id): Path<String>,
) -> SchedulerResult<Json<Envelope<()>>> {
    scheduler.delete(&id).await?;
    Ok(Json(Envelope {
        success: true,
        message: format!("task {} deleted", id),
        data: None,
    }))
}

async fn list_executions(
    State(scheduler): State<Arc<Scheduler>>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> SchedulerResult<Json<Envelope<ExecutionPage>>> {
    let page = scheduler
        .executions(&id, query.page, query.page_size)
        .await?;
    let message = format!("{} of {} executions", page.items.len(), page.total);
    Ok(Json(Envelope::ok(message, page)))
}

async fn read_log(
    State(scheduler): State<Arc<Scheduler>>,
    Path(execution_id): Path<String>,
) -> SchedulerResult<Json<Envelope<LogContent>>> {
    let execution_id: i64 = execution_id.parse().map_err(|_| {
        SchedulerError::InvalidInput(format!("invalid execution id: {}", execution_id))
    })?;
    let content = scheduler.read_log(execution_id).await?;
    let message = if content.synthesized {
        "log file unavailable, showing stored result".to_string()
    } else {
        "log file".to_string()
    };
    Ok(Json(Envelope::ok(message, content)))
}
