//! Integration tests module for Traffic Workbook
//!
//! Shared fixtures for the end-to-end capture, export, and import tests.

pub mod cancellation_test;
pub mod capture_test;
pub mod recovery_test;
pub mod round_trip_test;

use std::sync::Once;
use std::time::Duration;
use traffic_workbook::capture::CaptureBuffer;
use traffic_workbook::config::OverflowPolicy;
use traffic_workbook::models::CapturedExchange;

static INIT: Once = Once::new();

/// Initialize test environment (run once)
pub fn init_test_env() {
    INIT.call_once(traffic_workbook::logging::init_for_tests);
}

/// A representative exchange; `n` varies every field.
pub fn sample_exchange(n: usize) -> CapturedExchange {
    let tool = ["Proxy", "Repeater", "Scanner"][n % 3];
    let mut exchange = CapturedExchange::new(
        if n % 4 == 0 { "POST" } else { "GET" },
        format!("https://app{}.example.com/api/items/{}?q=a%20b", n % 5, n),
    )
    .with_request_header("Host", format!("app{}.example.com", n % 5))
    .with_request_header("Accept", "application/json")
    .with_response(if n % 7 == 0 { 500 } else { 200 })
    .with_response_header("Content-Type", "application/json")
    .with_response_body(format!("{{\"id\":{},\"name\":\"item <{}> & co\"}}", n, n).into_bytes())
    .with_source(tool)
    .with_latency(Duration::from_micros(1_500 + n as u64));

    if n % 4 == 0 {
        exchange = exchange.with_request_body(vec![0u8, 159, 146, 150, n as u8]);
    }
    if n % 6 == 0 {
        exchange = exchange.with_annotation(format!("note {}\r\nsecond line", n));
    }
    exchange
}

/// A buffer holding `count` sample exchanges.
pub fn filled_buffer(count: usize) -> CaptureBuffer {
    let buffer = CaptureBuffer::new(count.max(1), OverflowPolicy::EvictOldest);
    for n in 0..count {
        buffer
            .append(sample_exchange(n))
            .expect("evicting buffer never rejects");
    }
    buffer
}
