use crate::report::summary::RenderModel;

/// Prints the run outcome to stderr, one line per failed test.
pub fn print_summary(model: &RenderModel) {
    for group in &model.questions {
        for row in &group.rows {
            if !row.success {
                eprintln!(
                    "FAIL [test {} / {}]: {}",
                    row.test_id,
                    row.assistant_id,
                    row.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    eprintln!(
        "Results: total={} success={} failed={} rate={:.1}% time={:.2}s",
        model.total_tests,
        model.completed_tests,
        model.failed_tests,
        model.success_rate,
        model.total_execution_time
    );

    if !model.assistant_timings.is_empty() {
        eprintln!("Average execution time per assistant:");
        for t in &model.assistant_timings {
            eprintln!(
                "  {}: exec={:.2}s search={:.2}s crawl={:.2}s",
                t.assistant_id, t.execution_time, t.search_time, t.crawl_time
            );
        }
    }
}
