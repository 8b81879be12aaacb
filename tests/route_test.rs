//! Integration tests for path routing
//!
//! These tests validate, end to end through the scheduler:
//! - Prefix dispatch and 404 for unmatched paths
//! - Nested routers consuming the path segment by segment
//! - Resumption after `continue_with` replaces the unconsumed path

use std::time::Duration;

use prometheus_qos_scheduler::builders::SchedulerBuilder;
use prometheus_qos_scheduler::config::SchedulerConfig;
use prometheus_qos_scheduler::core::{add_headers, continue_with, get_method, route_path, Router, Scheduler, Step};
use prometheus_qos_scheduler::infra::{InMemoryExchange, Recorded};
use prometheus_qos_scheduler::transport::{RequestMetadata, Response};

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn scheduler() -> Scheduler {
    SchedulerBuilder::new(SchedulerConfig::new().with_worker_count(2).with_max_in_flight(8))
        .build()
        .unwrap()
}

fn get(scheduler: &Scheduler, path: &str, program: Step<Response>) -> Recorded {
    let exchange = InMemoryExchange::new(RequestMetadata::new("GET", path));
    let probe = exchange.probe();
    scheduler.submit(exchange.boxed(), program).unwrap();
    let recorded = probe.wait(WAIT).expect("exchange finished in time");
    assert!(scheduler.wait_idle(WAIT));
    recorded
}

/// Consumes nothing and yields the unconsumed path.
fn rest_of_path() -> Step<String> {
    route_path(|rest: &str| {
        let rest = rest.to_string();
        Some((rest.clone(), Step::pure(rest)))
    })
}

fn users() -> Step<Response> {
    Router::new()
        .prefix("/users", || rest_of_path().map(|id| Response::text(200, format!("user {id}"))))
        .prefix("/health", || Step::pure(Response::text(200, "ok")))
        .into_step()
}

fn app() -> Step<Response> {
    Router::new()
        .prefix("/api", users)
        .prefix("/", || get_method().map(|method| Response::text(200, format!("root {method}"))))
        .into_step()
}

// ============================================================================
// DISPATCH
// ============================================================================

#[test]
fn test_unmatched_path_gets_404() {
    let scheduler = scheduler();
    let router = Router::new().prefix("/api", || Step::pure(Response::text(200, "api")));
    let recorded = get(&scheduler, "/apix/users", router.into_step());
    assert_eq!(recorded.status, Some(404));
    assert_eq!(recorded.completions, 1);
    scheduler.stop();
}

#[test]
fn test_first_matching_prefix_wins() {
    let scheduler = scheduler();
    let recorded = get(&scheduler, "/api/health", app());
    assert_eq!(recorded.body_text(), "ok");

    let recorded = get(&scheduler, "/static/logo.png", app());
    assert_eq!(recorded.body_text(), "root GET");
    scheduler.stop();
}

#[test]
fn test_nested_routers_consume_the_path() {
    let scheduler = scheduler();
    let recorded = get(&scheduler, "/api/users/42", app());
    assert_eq!(recorded.status, Some(200));
    assert_eq!(recorded.body_text(), "user /42");
    scheduler.stop();
}

#[test]
fn test_inner_router_miss_is_404() {
    let scheduler = scheduler();
    let recorded = get(&scheduler, "/api/orders/1", app());
    assert_eq!(recorded.status, Some(404));
    scheduler.stop();
}

// ============================================================================
// CONTINUE
// ============================================================================

#[test]
fn test_continue_replaces_path_and_resumes_outer_program() {
    let scheduler = scheduler();
    // Rewrite a legacy path onto the current router, then keep going.
    let program = continue_with("/api/users/7", app()).flat_map(|response| {
        add_headers(vec![("x-rewritten".into(), "1".into())]).map(move |()| response)
    });
    let recorded = get(&scheduler, "/v1/user?id=7", program);
    assert_eq!(recorded.body_text(), "user /7");
    assert_eq!(recorded.header("x-rewritten"), vec!["1"]);
    scheduler.stop();
}

#[test]
fn test_continue_value_flows_into_continuation() {
    let scheduler = scheduler();
    let program = continue_with("/left/over", rest_of_path()).map(|rest| Response::text(200, rest));
    let recorded = get(&scheduler, "/ignored", program);
    assert_eq!(recorded.body_text(), "/left/over");
    scheduler.stop();
}
