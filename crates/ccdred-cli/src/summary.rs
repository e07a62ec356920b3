use console::Style;
use ccdred_core::pipeline::{HeaderMode, PipelineConfig, RunSummary};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    ok: Style,
    error: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            ok: Style::new().green().bold(),
            error: Style::new().red().bold(),
        }
    }
}

const RULE: &str = "\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}";

pub fn print_run_header(config: &PipelineConfig, file_count: usize) {
    let s = Styles::new();
    let params = config.combine_params();

    println!();
    println!("  {}", s.title.apply_to(format!("ccdred {}", config.product)));
    println!("  {}", s.title.apply_to(RULE));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Inputs"),
        s.value.apply_to(file_count)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.output_dir.display())
    );
    let keys = if config.keys.is_empty() {
        s.disabled.apply_to("none (one group)".to_string())
    } else {
        s.value.apply_to(config.keys.join(", "))
    };
    println!("  {:<14}{}", s.label.apply_to("Group by"), keys);
    println!();

    println!("  {}", s.header.apply_to("Combination"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Method"),
        s.method.apply_to(params.method)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Mode"),
        s.value.apply_to(config.effective_output_mode())
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Normalize"),
        s.value.apply_to(if params.normalize { "yes" } else { "no" })
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Window"),
        s.value.apply_to(format!(
            "({}, {}) over {} strips",
            params.bounds.min, params.bounds.max, params.strip_count
        ))
    );
    println!();

    println!("  {}", s.header.apply_to("Corrections"));
    let masters = [
        ("Bias", &config.corrections.bias),
        ("Dark", &config.corrections.dark),
        ("Flat", &config.corrections.flat),
    ];
    for (name, path) in masters {
        match path {
            Some(p) => println!(
                "    {:<12}{}",
                s.label.apply_to(name),
                s.path.apply_to(p.display())
            ),
            None => println!(
                "    {:<12}{}",
                s.label.apply_to(name),
                s.disabled.apply_to("none")
            ),
        }
    }
    if config.header != HeaderMode::Source {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Header"),
            s.value.apply_to(config.header)
        );
    }
    println!();
}

pub fn print_stage_title(label: &str) {
    let s = Styles::new();
    println!();
    println!("  {}", s.title.apply_to(format!("Stage {label}")));
}

pub fn print_run_summary(summary: &RunSummary) {
    let s = Styles::new();

    for group in &summary.groups {
        let status = if group.is_ok() {
            s.ok.apply_to("ok")
        } else {
            s.error.apply_to("failed")
        };
        println!(
            "  {:<40}{:>4} frame(s)  {}",
            s.value.apply_to(&group.label),
            group.frame_count,
            status
        );
        for path in &group.written {
            println!("    {}", s.path.apply_to(path.display()));
        }
        for rejected in &group.rejected {
            println!(
                "    {} {}",
                s.disabled.apply_to("rejected"),
                s.label.apply_to(rejected)
            );
        }
        for err in &group.errors {
            println!("    {}", s.error.apply_to(err));
        }
    }
    for (path, reason) in &summary.unassigned {
        println!(
            "  {} {} ({})",
            s.disabled.apply_to("unassigned"),
            s.path.apply_to(path.display()),
            s.label.apply_to(reason)
        );
    }

    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Written"),
        s.value.apply_to(summary.written().len())
    );
    let failed = summary.failures().len();
    if failed > 0 {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Failed"),
            s.error.apply_to(failed)
        );
    }
}
