use crate::domain::report::RunMode;
use crate::market::types::{MarketSnapshot, SectorHeat};

pub fn system_prompt() -> String {
    // Keep strict and provider-agnostic: JSON only, no prose.
    [
        "You are a senior A-share market risk analyst. Calm, objective, data-driven.",
        "Return ONLY valid JSON. Do not wrap in markdown. Do not include any extra keys.",
        "No trailing commas. No comments. Use double quotes for all JSON strings.",
        "Output schema:",
        "{",
        "  \"narrative\": \"full report text: core contradictions, positioning advice, scenario outlook\",",
        "  \"scenarios\": [",
        "    {\"label\": \"base\", \"probability\": 0.6, \"narrative\": \"...\"}",
        "  ]",
        "}",
        "Rules:",
        "- scenarios must be non-empty, ordered base, optimistic, pessimistic",
        "- probability must be in [0, 1]; probabilities need not sum to 1",
        "- keep the narrative concrete: cite the provided numbers, no hedging boilerplate",
    ]
    .join("\n")
}

pub fn user_prompt(snapshot: &MarketSnapshot, run_mode: RunMode) -> String {
    format!(
        "Task: produce a {report_kind} for {date}. Title the scenario section {forecast_title:?}.\n\n\
         Market data:\n\
         - index close: {index_close} ({index_pct_change:+.2}%)\n\
         - total turnover estimate: {turnover} trillion\n\
         - margin leverage ratio: {leverage:.2}%\n\
         - main net inflow: {main:.2} | retail net inflow: {retail:.2} (hundred million)\n\
         - winner ratio: {win_rate:.1}%\n\
         - strongest sectors: {strong}\n\
         - weakest sectors: {weak}",
        report_kind = report_kind(run_mode),
        date = snapshot.as_of_date,
        forecast_title = forecast_title(run_mode),
        index_close = snapshot.index_close,
        index_pct_change = snapshot.index_pct_change,
        turnover = snapshot.turnover_estimate,
        leverage = snapshot.leverage_ratio,
        main = snapshot.main_net_inflow,
        retail = snapshot.retail_net_inflow,
        win_rate = snapshot.win_rate,
        strong = format_sectors(&snapshot.sectors.strong),
        weak = format_sectors(&snapshot.sectors.weak),
    )
}

fn report_kind(run_mode: RunMode) -> &'static str {
    match run_mode {
        RunMode::PreMarket => "pre-market live risk analysis",
        RunMode::Midday => "midday risk summary",
        RunMode::PostMarket => "post-market risk review",
        RunMode::Manual => "on-demand risk review",
    }
}

fn forecast_title(run_mode: RunMode) -> &'static str {
    match run_mode {
        RunMode::PreMarket => "morning session outlook",
        RunMode::Midday => "afternoon session outlook",
        RunMode::PostMarket => "next trading day outlook",
        RunMode::Manual => "next session outlook",
    }
}

fn format_sectors(sectors: &[SectorHeat]) -> String {
    if sectors.is_empty() {
        return "n/a".to_string();
    }
    sectors
        .iter()
        .map(|s| format!("{} ({:.1})", s.name, s.heat))
        .collect::<Vec<_>>()
        .join(", ")
}
