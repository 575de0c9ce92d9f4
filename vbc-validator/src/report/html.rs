// Self-contained HTML rendering of a ValidationReport
//
// Markup is built with format! over raw strings; every interpolated value
// passes through escape() first.

use std::fmt::Write;
use vbc_common::human_fmt::{money, pct, plain};
use vbc_common::models::{Flag, Severity, SeverityCounts};

use super::{ContractSection, FinancialSummary, ValidationReport};
use crate::diagnosis::DiagnosticNarrative;

const STYLE: &str = r#"
        * { box-sizing: border-box; }
        body {
            font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif;
            background-color: #f4f6f8;
            color: #222;
            line-height: 1.5;
            margin: 0;
        }
        header {
            background-color: #1f3a5f;
            color: #fff;
            padding: 20px 32px;
        }
        header h1 { margin: 0 0 4px 0; font-size: 24px; }
        .build-info { font-size: 12px; color: #c8d3e0; }
        main { padding: 24px 32px; }
        section {
            background: #fff;
            border-radius: 6px;
            padding: 16px 20px;
            margin-bottom: 24px;
            box-shadow: 0 1px 3px rgba(0,0,0,0.08);
        }
        h2 { margin-top: 0; border-bottom: 2px solid #1f3a5f; padding-bottom: 6px; }
        table { border-collapse: collapse; width: 100%; font-size: 14px; }
        th, td { text-align: left; padding: 6px 8px; border-bottom: 1px solid #e3e7eb; vertical-align: top; }
        th { background: #eef2f6; }
        .counts span { display: inline-block; margin-right: 16px; font-weight: 600; }
        .badge { display: inline-block; padding: 2px 8px; border-radius: 10px; color: #fff; font-size: 12px; font-weight: 600; }
        .badge.RED { background: #c62828; }
        .badge.YELLOW { background: #f9a825; color: #222; }
        .badge.GREEN { background: #2e7d32; }
        .gate-pass { color: #2e7d32; font-weight: 600; }
        .gate-fail { color: #c62828; font-weight: 600; }
        .detail { color: #555; font-size: 13px; }
        .narrative h3 { margin-bottom: 4px; }
        .muted { color: #777; }
"#;

/// Escape text for HTML element and attribute content.
pub fn escape(text: &str) -> String {
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

fn badge(severity: Severity) -> String {
    format!(r#"<span class="badge {0}">{0}</span>"#, severity.as_str())
}

fn counts_line(counts: &SeverityCounts) -> String {
    format!(
        r#"<div class="counts"><span>Total: {}</span><span>{} {}</span><span>{} {}</span><span>{} {}</span></div>"#,
        counts.total(),
        badge(Severity::Red),
        counts.red,
        badge(Severity::Yellow),
        counts.yellow,
        badge(Severity::Green),
        counts.green
    )
}

fn gate_row(financial: &FinancialSummary) -> String {
    match &financial.quality_gate {
        Some(gate) => {
            let (class, status) = if gate.passes() {
                ("gate-pass", "PASS")
            } else {
                ("gate-fail", "FAIL")
            };
            format!(
                r#"<tr><th>Quality gate</th><td><span class="{class}">{status}</span> composite {:.1}% ({}/{}) vs minimum {}%</td></tr>"#,
                gate.composite_pct,
                escape(&plain(gate.earned)),
                escape(&plain(gate.max_points)),
                escape(&plain(gate.gate_minimum))
            )
        }
        None => r#"<tr><th>Quality gate</th><td class="muted">No composite measure reported</td></tr>"#
            .to_string(),
    }
}

fn financial_table(financial: &FinancialSummary) -> String {
    let outcome = if financial.savings > 0.0 {
        "Savings"
    } else {
        "Losses"
    };
    let mut rows = format!(
        r#"<table>
<tr><th>Total episodes</th><td>{}</td></tr>
<tr><th>Total cost</th><td>{}</td></tr>
<tr><th>Total target</th><td>{}</td></tr>
<tr><th>Variance</th><td>{} ({})</td></tr>
<tr><th>{outcome}</th><td>{}</td></tr>
<tr><th>Sharing rate</th><td>{}</td></tr>
<tr><th>Provider share</th><td>{}</td></tr>
"#,
        plain(financial.total_episodes),
        money(financial.total_cost),
        money(financial.total_target),
        money(financial.variance),
        pct(financial.variance_pct, 1),
        money(financial.savings.abs()),
        pct(financial.sharing_rate, 0),
        money(financial.provider_share)
    );
    rows.push_str(&gate_row(financial));
    if financial.forfeited_share > 0.0 {
        let _ = write!(
            rows,
            r#"<tr><th>Forfeited share</th><td class="gate-fail">{} forfeited: quality gate not met</td></tr>"#,
            money(financial.forfeited_share)
        );
    }
    rows.push_str("</table>");
    rows
}

fn contract_section(section: &ContractSection<'_>) -> String {
    let contract = section.contract;
    let title = match &contract.contract_name {
        Some(name) => format!("{} ({})", name, contract.contract_id),
        None => contract.contract_id.clone(),
    };
    format!(
        r#"<section>
<h2>{} <span class="muted">{}</span></h2>
{}
<h3>Financial summary</h3>
{}
</section>
"#,
        escape(&title),
        escape(contract.specialty.as_str()),
        counts_line(&section.counts),
        financial_table(&section.financial)
    )
}

fn flag_row(flag: &Flag) -> String {
    format!(
        r#"<tr>
<td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>
<td>{}<div class="detail">{}</div></td>
</tr>
"#,
        badge(flag.severity),
        escape(&flag.flag_id),
        escape(&flag.contract_id),
        escape(&flag.episode_type),
        escape(&flag.metric_name),
        escape(&flag.metric_value.to_string()),
        escape(&flag.expected_value),
        escape(&flag.description),
        escape(&flag.detail)
    )
}

fn flags_section(flags: &[&Flag]) -> String {
    if flags.is_empty() {
        return r#"<section><h2>Flags</h2><p class="muted">No flags raised.</p></section>"#.to_string();
    }
    let rows: String = flags.iter().map(|f| flag_row(f)).collect();
    format!(
        r#"<section>
<h2>Flags</h2>
<table>
<tr><th>Severity</th><th>ID</th><th>Contract</th><th>Episode</th><th>Metric</th><th>Value</th><th>Expected</th><th>Finding</th></tr>
{rows}</table>
</section>
"#
    )
}

fn list<T>(items: &[T], render: impl Fn(&T) -> String) -> String {
    if items.is_empty() {
        return r#"<p class="muted">None</p>"#.to_string();
    }
    let body: String = items
        .iter()
        .map(|item| format!("<li>{}</li>", render(item)))
        .collect();
    format!("<ul>{body}</ul>")
}

fn narrative_block(narrative: &DiagnosticNarrative) -> String {
    let causes = list(&narrative.probable_causes, |c| {
        format!(
            "<strong>{}</strong> ({} likelihood): {}",
            escape(&c.cause),
            escape(&c.likelihood),
            escape(&c.evidence)
        )
    });
    let questions = list(&narrative.questions_for_provider, |q| escape(q));
    let interventions = list(&narrative.recommended_interventions, |i| {
        format!(
            "<strong>{}</strong> [{}]: {}",
            escape(&i.intervention),
            escape(&i.timeframe),
            escape(&i.expected_impact)
        )
    });
    format!(
        r#"<div class="narrative">
<h3>{}</h3>
<p>{}</p>
<h4>Probable causes</h4>{causes}
<h4>Questions for provider</h4>{questions}
<h4>Recommended interventions</h4>{interventions}
<h4>Contract implications</h4><p>{}</p>
<p class="muted">Flags addressed: {}</p>
</div>
"#,
        escape(&narrative.episode_type),
        escape(&narrative.diagnosis_summary),
        escape(&narrative.contract_implications),
        escape(&narrative.flags_addressed.join(", "))
    )
}

fn narratives_section(narratives: &[DiagnosticNarrative]) -> String {
    if narratives.is_empty() {
        return String::new();
    }
    let blocks: String = narratives.iter().map(narrative_block).collect();
    format!("<section>\n<h2>AI diagnostics</h2>\n{blocks}</section>\n")
}

/// Render the full report page.
pub fn render(report: &ValidationReport<'_>) -> String {
    let version = env!("CARGO_PKG_VERSION");
    let git_hash = env!("GIT_HASH");
    let build_timestamp = env!("BUILD_TIMESTAMP");
    let build_profile = env!("BUILD_PROFILE");

    let sections: String = report.sections.iter().map(contract_section).collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>VBC Performance Report Validation</title>
    <style>{STYLE}</style>
</head>
<body>
<header>
    <h1>VBC Performance Report Validation</h1>
    <div>Generated {}</div>
    <div class="build-info">vbc-validator v{version} [{git_hash}] built {build_timestamp} ({build_profile})</div>
</header>
<main>
<section>
<h2>Overall</h2>
{}
</section>
{sections}{}{}</main>
</body>
</html>
"#,
        escape(&report.generated_at),
        counts_line(&report.counts),
        flags_section(&report.flags),
        narratives_section(report.narratives)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ValidationRun;
    use vbc_common::models::{Category, Contract, Specialty};

    fn flag(id: &str, severity: Severity, description: &str) -> Flag {
        Flag {
            flag_id: id.to_string(),
            severity,
            category: Category::Range,
            metric_name: "avg_episode_cost".to_string(),
            metric_value: 1.0.into(),
            expected_value: "<2".to_string(),
            episode_type: "TKR".to_string(),
            contract_id: "MSK-T".to_string(),
            description: description.to_string(),
            detail: String::new(),
            related_metrics: Default::default(),
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<b>"A&B's"</b>"#),
            "&lt;b&gt;&quot;A&amp;B&#39;s&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_render_orders_flags_and_escapes_text() {
        let run = ValidationRun::new(vec![
            flag("RANGE-001", Severity::Green, "fine"),
            flag("RANGE-002", Severity::Red, "<script>alert(1)</script>"),
        ]);
        let contract = Contract::new("MSK-T", Specialty::Msk);
        let narratives = vec![DiagnosticNarrative {
            episode_type: "TKR".to_string(),
            diagnosis_summary: "Implants & devices".to_string(),
            ..Default::default()
        }];
        let records = crate::loader::Records::default();
        let sections = vec![ContractSection::new(&contract, &run, records.msk())];
        let report = ValidationReport::new(&run, sections, &narratives);
        let page = render(&report);

        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("Implants &amp; devices"));
        let red = page.find("RANGE-002").unwrap();
        let green = page.find("RANGE-001").unwrap();
        assert!(red < green);
        assert!(page.contains("No composite measure reported"));
    }
}
