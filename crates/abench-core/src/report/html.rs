use crate::model::AssessmentLabel;
use crate::report::markdown::{escape, markdown_to_html};
use crate::report::summary::RenderModel;
use std::path::Path;

fn assessment_emoji(label: Option<AssessmentLabel>) -> &'static str {
    match label {
        Some(AssessmentLabel::Green) => "\u{1F7E2}",
        Some(AssessmentLabel::Yellow) => "\u{1F7E1}",
        Some(AssessmentLabel::Red) => "\u{1F534}",
        None => "\u{274C}",
    }
}

fn assessment_text(label: Option<AssessmentLabel>) -> &'static str {
    match label {
        Some(AssessmentLabel::Green) => "GREEN",
        Some(AssessmentLabel::Yellow) => "YELLOW",
        Some(AssessmentLabel::Red) => "RED",
        None => "N/A",
    }
}

/// Renders the question-centric report and writes it to `out`.
pub fn write_html(model: &RenderModel, out: &Path) -> anyhow::Result<()> {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>Experiment Report</title>\n");
    html.push_str(
        "<style>\nbody { font-family: sans-serif; margin: 2em; }\n\
         table { border-collapse: collapse; margin: 1em 0; }\n\
         th, td { border: 1px solid #ccc; padding: 0.4em 0.8em; vertical-align: top; }\n\
         th { background: #f0f0f0; }\n\
         .golden { background: #fffbe6; border: 1px solid #e0d8a0; padding: 0.8em; }\n\
         </style>\n</head>\n<body>\n",
    );

    html.push_str("<h1>Experiment Report</h1>\n");
    html.push_str(&format!(
        "<p>Total tests: {} | Successful: {} | Failed: {} | Success rate: {:.1}% | \
         Total execution time: {:.2}s</p>\n",
        model.total_tests,
        model.completed_tests,
        model.failed_tests,
        model.success_rate,
        model.total_execution_time,
    ));

    if !model.assistant_timings.is_empty() {
        html.push_str("<h2>Average times per assistant</h2>\n<table>\n");
        html.push_str(
            "<tr><th>Assistant</th><th>Search (s)</th><th>Crawl (s)</th><th>Execution (s)</th></tr>\n",
        );
        for t in &model.assistant_timings {
            html.push_str(&format!(
                "<tr><td>{}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td></tr>\n",
                escape(&t.assistant_id),
                t.search_time,
                t.crawl_time,
                t.execution_time,
            ));
        }
        html.push_str("</table>\n");
    }

    for group in &model.questions {
        html.push_str(&format!(
            "<h2>Question {}: {}</h2>\n",
            group.question_id,
            escape(&group.question)
        ));
        html.push_str(&format!(
            "<p>Success rate: {:.1}%</p>\n",
            group.success_rate
        ));
        if let Some(golden) = &group.golden_answer {
            html.push_str("<div class=\"golden\">\n<h3>Golden answer</h3>\n");
            html.push_str(&markdown_to_html(golden));
            html.push_str("\n</div>\n");
        }

        html.push_str("<table>\n");
        html.push_str(
            "<tr><th>Test</th><th>Assistant</th><th>Chat</th><th>Status</th>\
             <th>Verdict</th><th>Answer</th><th>Time (s)</th></tr>\n",
        );
        for row in &group.rows {
            let status = if row.success { "\u{2705}" } else { "\u{274C}" };
            let answer = match (&row.answer, &row.error) {
                (Some(answer), _) => markdown_to_html(answer),
                (None, Some(error)) => format!("<em>{}</em>", escape(error)),
                (None, None) => "N/A".to_string(),
            };
            html.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
                 <td>{} {}</td><td>{}</td><td>{:.2}</td></tr>\n",
                row.test_id,
                escape(&row.assistant_id),
                escape(&row.chat_id),
                status,
                assessment_emoji(row.assessment),
                assessment_text(row.assessment),
                answer,
                row.execution_time,
            ));
        }
        html.push_str("</table>\n");
    }

    html.push_str("</body>\n</html>\n");
    std::fs::write(out, html)?;
    Ok(())
}
