use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

lazy_static::lazy_static! {
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "simsearch_http_requests_total", "Total HTTP requests", &["method", "path", "status"]
    ).unwrap();
    pub static ref QUERY_DURATION: HistogramVec = register_histogram_vec!(
        "simsearch_query_duration_seconds", "Search duration", &["algorithm"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();
    pub static ref QUERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "simsearch_queries_total", "Total searches", &["algorithm", "status"]
    ).unwrap();
    pub static ref SORTED_ACCESSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "simsearch_sorted_accesses_total", "Sorted accesses", &["attribute"]
    ).unwrap();
    pub static ref RANDOM_ACCESSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "simsearch_random_accesses_total", "Random accesses", &["attribute"]
    ).unwrap();
    pub static ref SCORING_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "simsearch_scoring_errors_total", "Stored values that could not be scored", &["kind"]
    ).unwrap();
    pub static ref SOURCE_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "simsearch_source_failures_total", "Source failures during a search", &["attribute"]
    ).unwrap();
    pub static ref INEXACT_RESULTS_TOTAL: IntCounter = register_int_counter!(
        "simsearch_inexact_results_total", "Result lists returned without an exactness guarantee"
    ).unwrap();
}

pub fn init() {
    lazy_static::initialize(&HTTP_REQUESTS_TOTAL);
    lazy_static::initialize(&QUERY_DURATION);
    lazy_static::initialize(&QUERIES_TOTAL);
    lazy_static::initialize(&SORTED_ACCESSES_TOTAL);
    lazy_static::initialize(&RANDOM_ACCESSES_TOTAL);
    lazy_static::initialize(&SCORING_ERRORS_TOTAL);
    lazy_static::initialize(&SOURCE_FAILURES_TOTAL);
    lazy_static::initialize(&INEXACT_RESULTS_TOTAL);
}
