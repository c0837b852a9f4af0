use crate::analyser::core::CaseReport;
use crate::analyser::utils::format_micros;
use crate::errors::Result;
use crate::inference::confidence::ConfidenceLevel;
use ansi_term::Colour;
use std::fs;
use std::path::Path;

pub fn print_results(report: &CaseReport) {
    println!("\n\u{250F}\u{2501}\u{2501}\u{2501}\u{2501} Results");
    print_capture(report);
    for flow in report.likely_tor_flows() {
        print_flow(report, flow.index);
    }
    if !report.paths.is_empty() {
        print_paths(report);
    }
    if !report.entries.is_empty() {
        print_entries(report);
    }
    print_confidence(report);
    println!("\u{2517}\u{2501}\u{2501}\u{2501}\u{2501}");
}

fn print_capture(report: &CaseReport) {
    let capture = &report.capture;
    println!("\u{2503}");
    println!("\u{2503} Link type        : {}", Colour::Fixed(226).paint(capture.header.link_type.to_string()));
    println!("\u{2503} Records          : {}", Colour::Fixed(226).paint(capture.records.to_string()));
    println!("\u{2503} Without 5-tuple  : {}", capture.records_without_tuple);
    println!("\u{2503} Status           : {:?}", capture.status);
    if capture.clamped_records > 0 {
        println!("\u{2503} Clamped records  : {}", Colour::Yellow.paint(capture.clamped_records.to_string()));
    }
    if capture.partial {
        println!("\u{2503} {}", Colour::Yellow.paint("Partial reconstruction (packet limit reached)"));
    }
    println!(
        "\u{2503} Flows            : {} ({} TOR-like)",
        report.flows.len(),
        Colour::Red.paint(report.likely_tor_flows().count().to_string())
    );
    println!("\u{2503}");
}

fn print_flow(report: &CaseReport, index: usize) {
    let Some(flow) = report.flows.iter().find(|flow| flow.index == index) else {
        return;
    };
    println!("\u{2523}\u{2501}\u{2501} Flow {}", Colour::Red.paint(index.to_string()));
    println!("\u{2503} {} \u{21C4} {}", flow.key.forward, flow.key.reverse);
    println!(
        "\u{2503} Seen             : {} .. {}",
        format_micros(flow.first_seen_micros),
        format_micros(flow.last_seen_micros)
    );
    println!(
        "\u{2503} Packets          : {} fwd / {} rev ({} bytes)",
        flow.forward_packets,
        flow.reverse_packets,
        flow.total_bytes()
    );
    println!("\u{2503} Cell ratio       : {:.3}", flow.cell_ratio);
    println!("\u{2503} Directionality   : {:.3}", flow.directionality);
    println!("\u{2503} Bursts           : {}", flow.bursts.len());
    if let Some(print) = report.fingerprints.iter().find(|print| print.flow_index == index) {
        let tags: Vec<&str> = print.pattern_tags.iter().map(|tag| tag.as_str()).collect();
        println!("\u{2503} Fingerprint      : {}", Colour::Fixed(226).paint(&print.hash));
        println!("\u{2503} Patterns         : {}", tags.join(", "));
        println!("\u{2503} TOR likelihood   : {:.3}", print.tor_likelihood);
    }
    println!("\u{2503}");
}

fn print_paths(report: &CaseReport) {
    println!("\u{2523}\u{2501}\u{2501} Plausible paths");
    for path in &report.paths {
        println!(
            "\u{2503} {:.3}  {} \u{2192} {} \u{2192} {}",
            path.score, path.guard, path.middle, path.exit
        );
    }
    println!("\u{2503}");
}

fn print_entries(report: &CaseReport) {
    println!("\u{2523}\u{2501}\u{2501} Entry candidates");
    for (rank, entry) in report.entries.iter().enumerate() {
        println!(
            "\u{2503} #{} {}  posterior {:.4} (prior {:.4}, {} obs)",
            rank + 1,
            Colour::Fixed(226).paint(&entry.fingerprint),
            entry.posterior,
            entry.prior,
            entry.observations
        );
    }
    if let Some(entropy) = report.entropy {
        println!("\u{2503} Entropy          : {:.4} nats", entropy);
    }
    println!("\u{2503}");
}

/// Bounds and caveat are always shown alongside the score.
fn print_confidence(report: &CaseReport) {
    match &report.confidence {
        Some(confidence) => {
            let colour = match confidence.level {
                ConfidenceLevel::High => Colour::Green,
                ConfidenceLevel::Medium => Colour::Yellow,
                ConfidenceLevel::Low => Colour::Red,
            };
            println!("\u{2523}\u{2501}\u{2501} Confidence");
            println!(
                "\u{2503} Score            : {} ({:?})",
                colour.paint(format!("{:.3}", confidence.score)),
                confidence.level
            );
            println!(
                "\u{2503} Bounds           : [{:.3}, {:.3}] \u{00B1}{:.3}",
                confidence.lower_bound, confidence.upper_bound, confidence.uncertainty_margin
            );
            println!("\u{2503} False positives  : {:.3}", confidence.false_positive_rate);
            for factor in &confidence.contributing_factors {
                println!("\u{2503}  + {factor}");
            }
            for factor in &confidence.limiting_factors {
                println!("\u{2503}  - {factor}");
            }
        }
        None => println!("\u{2503} No relay inference performed."),
    }
    println!("\u{2503}");
    println!("\u{2503} {}", Colour::Fixed(244).paint(&report.caveat));
}

pub fn data_as_json(report: &CaseReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn data_to_file(json: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json)?;
    log::info!("Report written to {}", path.display());
    Ok(())
}

pub fn print_banner() {
    println!(r"                                   __");
    println!(r"   __ _ _  _ __ _ _ _ __| |_ _ (_)/ _|/ _|");
    println!(r"  / _` | || / _` | '_/ _` | ' \| |  _|  _|");
    println!(r"  \__, |\_,_\__,_|_| \__,_|_||_|_|_| |_|");
    println!(r"  |___/");
}
