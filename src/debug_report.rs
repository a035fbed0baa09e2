use curbside::{Anomaly, AnomalyKind, Classification, ReconcileResult};
use std::collections::BTreeMap;

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const RED: &str = "\x1b[31m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

const SAMPLES_PER_KIND: usize = 3;

pub fn print_run(result: &ReconcileResult, color: bool) {
    let palette = ansi::Palette::new(color);
    let counts = &result.metrics.counts;
    println!(
        "\n{}",
        palette.bold(palette.paint(
            format!("⚙  Reconciled {} segments, {} records", counts.segments, counts.records),
            ansi::CYAN
        ))
    );

    println!("\n{}", palette.paint("━━━ Blockfaces ━━━", ansi::GRAY));
    print_blockfaces(result, &palette);

    println!("\n{}", palette.paint("━━━ Join ━━━", ansi::GRAY));
    println!(
        "  Primary: {}  │  Spatial: {}  │  Dropped: {}",
        palette.paint(counts.primary_matches.to_string(), ansi::GREEN),
        palette.paint(counts.spatial_matches.to_string(), ansi::BLUE),
        if counts.dropped > 0 {
            palette.paint(counts.dropped.to_string(), ansi::RED)
        } else {
            palette.dim(counts.dropped.to_string())
        }
    );

    println!("\n{}", palette.paint("━━━ Anomalies ━━━", ansi::GRAY));
    if result.anomalies.is_empty() {
        println!("{}", palette.dim("  None"));
    } else {
        print_anomalies(&result.anomalies, &palette);
    }

    let stages = &result.metrics.stages;
    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!(
        "  Total: {}  │  Geometry: {}  │  Join: {}  │  Assemble: {}  │  Validate: {}",
        palette.paint(format!("{:?}", stages.total), ansi::GREEN),
        palette.paint(format!("{:?}", stages.geometry), ansi::CYAN),
        palette.paint(format!("{:?}", stages.join), ansi::CYAN),
        palette.dim(format!("{:?}", stages.assemble)),
        palette.dim(format!("{:?}", stages.validate)),
    );
    println!();
}

fn print_blockfaces(result: &ReconcileResult, palette: &ansi::Palette) {
    let counts = &result.metrics.counts;
    let rules = result.blockfaces.iter().flat_map(|b| &b.rules);
    let (parser, ai) = rules.fold((0, 0), |(p, a), r| match r.classification {
        Classification::Parser => (p + 1, a),
        Classification::Ai => (p, a + 1),
    });
    let empty = result.blockfaces.iter().filter(|b| b.rules.is_empty()).count();
    let no_geometry = result.blockfaces.iter().filter(|b| b.geometry.is_none()).count();

    println!(
        "  {} blockfaces  {} {} empty  {} {} without geometry  {} {} degraded",
        palette.bold(counts.blockfaces.to_string()),
        palette.dim("│"),
        palette.paint(empty.to_string(), ansi::YELLOW),
        palette.dim("│"),
        palette.paint(no_geometry.to_string(), ansi::YELLOW),
        palette.dim("│"),
        palette.paint(counts.degraded_geometries.to_string(), ansi::YELLOW),
    );
    println!(
        "  Rules: {} PARSER  {} {} AI  {} {}",
        palette.paint(parser.to_string(), ansi::GREEN),
        palette.dim("│"),
        palette.paint(ai.to_string(), ansi::BLUE),
        palette.dim("│ interpreted:"),
        palette.paint(counts.interpreted.to_string(), ansi::CYAN),
    );
}

fn print_anomalies(anomalies: &[Anomaly], palette: &ansi::Palette) {
    let mut by_kind: BTreeMap<AnomalyKind, Vec<&Anomaly>> = BTreeMap::new();
    for anomaly in anomalies {
        by_kind.entry(anomaly.kind).or_default().push(anomaly);
    }

    for (kind, found) in &by_kind {
        println!(
            "  {} {}",
            palette.paint(format!("{:<28}", kind.as_str()), ansi::YELLOW),
            palette.bold(found.len().to_string())
        );
        for anomaly in found.iter().take(SAMPLES_PER_KIND) {
            println!("    {} {}", palette.paint(anomaly.key.to_string(), ansi::BLUE), palette.dim(&anomaly.detail));
        }
        if found.len() > SAMPLES_PER_KIND {
            println!("    {}", palette.dim(format!("... +{} more", found.len() - SAMPLES_PER_KIND)));
        }
    }
}
