//! Terminal summaries for training, scoring and explain runs

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, CellAlignment, Color, Table};
use console::style;

use crate::pipeline::{EvaluationMetrics, FeatureImportance, ScoredFrame, TrainingOutcome};

fn print_section(icon: &str, title: &str) {
    println!();
    println!("    {} {}", style(icon).cyan(), style(title).white().bold());
    println!("    {}", style("─".repeat(50)).dim());
    println!();
}

fn print_indented(table: &Table) {
    for line in table.to_string().lines() {
        println!("    {}", line);
    }
}

fn auc_cell(auc: Option<f64>) -> Cell {
    match auc {
        Some(v) => {
            let color = if v >= 0.8 {
                Color::Green
            } else if v >= 0.7 {
                Color::Yellow
            } else {
                Color::Red
            };
            Cell::new(format!("{:.4}", v)).fg(color).add_attribute(Attribute::Bold)
        }
        None => Cell::new("n/a").fg(Color::DarkGrey),
    }
}

fn metrics_row(split: &str, metrics: &EvaluationMetrics) -> Vec<Cell> {
    vec![
        Cell::new(split),
        Cell::new(metrics.rows).set_alignment(CellAlignment::Right),
        auc_cell(metrics.auc),
        Cell::new(format!("{:.4}", metrics.f1)),
        Cell::new(format!("{:.4}", metrics.confusion.precision())),
        Cell::new(format!("{:.4}", metrics.confusion.recall())),
        Cell::new(format!("{:.4}", metrics.confusion.accuracy())),
    ]
}

/// Summary of a training run
pub struct TrainingSummary<'a> {
    outcome: &'a TrainingOutcome,
}

impl<'a> TrainingSummary<'a> {
    pub fn new(outcome: &'a TrainingOutcome) -> Self {
        Self { outcome }
    }

    pub fn display(&self) {
        let training = &self.outcome.artifact.training;

        print_section("📋", "TRAINING SUMMARY");

        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Metric").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);
        table.add_row(vec![Cell::new("👥 Labeled customers"), Cell::new(training.rows)]);
        table.add_row(vec![
            Cell::new("🚪 Churned / Stayed"),
            Cell::new(format!("{} / {}", training.churned, training.stayed)),
        ]);
        table.add_row(vec![
            Cell::new("✂️  Train / Hold-out"),
            Cell::new(format!("{} / {}", training.train_rows, training.test_rows)),
        ]);
        table.add_row(vec![
            Cell::new("🧮 Model features"),
            Cell::new(self.outcome.artifact.feature_names().len()),
        ]);
        table.add_row(vec![
            Cell::new("🔁 Solver iterations"),
            Cell::new(training.fit.iterations).fg(if training.fit.converged {
                Color::White
            } else {
                Color::Yellow
            }),
        ]);
        table.add_row(vec![
            Cell::new("⚖️  Threshold"),
            Cell::new(format!("{:.2}", self.outcome.artifact.threshold)),
        ]);
        print_indented(&table);

        print_section("📈", "EVALUATION");
        let mut metrics = Table::new();
        metrics.load_preset(UTF8_FULL_CONDENSED);
        metrics.set_header(
            ["Split", "Rows", "AUC", "F1", "Precision", "Recall", "Accuracy"]
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
        metrics.add_row(metrics_row("train", &training.train_metrics));
        match &training.holdout_metrics {
            Some(holdout) => {
                metrics.add_row(metrics_row("hold-out", holdout));
            }
            None => {
                metrics.add_row(vec![
                    Cell::new("hold-out"),
                    Cell::new(training.test_rows),
                    Cell::new("skipped").fg(Color::Yellow),
                ]);
            }
        }
        print_indented(&metrics);

        if !self.outcome.missing.is_empty() {
            print_section("🕳️ ", "IMPUTED FEATURES");
            for (feature, ratio) in &self.outcome.missing {
                println!(
                    "      {} {} {}",
                    style("•").dim(),
                    feature,
                    style(format!("({:.1}% missing)", ratio * 100.0)).dim()
                );
            }
        }

        let unseen = self.outcome.holdout_stats.total_unseen();
        if unseen > 0 {
            println!();
            println!(
                "      {} {} hold-out value(s) had categories unseen in training",
                style("ℹ").cyan(),
                style(unseen).yellow().bold()
            );
        }
    }
}

/// Print the outcome of a scoring run
pub fn display_prediction_summary(scored: &ScoredFrame) {
    print_section("🔮", "PREDICTION SUMMARY");

    let total = scored.records.len();
    let churners = scored.predicted_churners();
    let pct = if total > 0 {
        churners as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    let mean_probability = if total > 0 {
        scored.records.iter().map(|r| r.probability).sum::<f64>() / total as f64
    } else {
        0.0
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Metric").add_attribute(Attribute::Bold),
        Cell::new("Value").add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![Cell::new("👥 Scored customers"), Cell::new(total)]);
    table.add_row(vec![
        Cell::new("🚨 Predicted churners"),
        Cell::new(format!("{} ({:.1}%)", churners, pct))
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![
        Cell::new("📊 Mean probability"),
        Cell::new(format!("{:.4}", mean_probability)),
    ]);
    table.add_row(vec![
        Cell::new("⚖️  Threshold"),
        Cell::new(format!("{:.2}", scored.threshold)),
    ]);
    if scored.stats.total_unseen() > 0 {
        table.add_row(vec![
            Cell::new("❔ Unseen categories"),
            Cell::new(scored.stats.total_unseen()).fg(Color::Yellow),
        ]);
    }
    print_indented(&table);
}

/// Print the top-ranked features
pub fn display_importance_table(features: &[FeatureImportance]) {
    print_section("🏆", "GLOBAL FEATURE IMPORTANCE");

    let max = features.first().map_or(0.0, |f| f.importance);

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Feature").add_attribute(Attribute::Bold),
        Cell::new("Impact").add_attribute(Attribute::Bold),
        Cell::new("").add_attribute(Attribute::Bold),
    ]);

    for f in features {
        let width = if max > 0.0 {
            ((f.importance / max) * 20.0).round() as usize
        } else {
            0
        };
        table.add_row(vec![
            Cell::new(f.rank).set_alignment(CellAlignment::Right),
            Cell::new(&f.feature),
            Cell::new(format!("{:.5}", f.importance)),
            Cell::new("█".repeat(width)).fg(Color::Cyan),
        ]);
    }
    print_indented(&table);
}
