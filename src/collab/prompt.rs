//! # prompt — narrative prompt for the AI step
//!
//! Plain concatenation of the record's numeric facts, market context and the
//! dealer summary. The reply is stored verbatim, so the prompt asks for a
//! short answer only.

use super::market::PriceMove;
use crate::models::DailyMetalRecord;

pub fn build_prompt(record: &DailyMetalRecord, price: Option<&PriceMove>, open_interest: Option<u64>) -> String {
    let price_line = price
        .map(|p| format!("- Close: {:.2} ({:+.2}% vs prior session)", p.close, p.change_pct))
        .unwrap_or_else(|| "- Close: N/A".to_string());

    let oi_line = open_interest
        .map(|oi| format!("- Open interest (front month): {oi}"))
        .unwrap_or_else(|| "- Open interest: N/A".to_string());

    let commodity = record.commodity;
    let stock = &record.stock;

    format!(r#"You are a senior commodities analyst covering CME {commodity}.

## Warehouse Stocks ({date})
- Registered: {reg:.0}
- Eligible: {elig:.0}
- Total: {total:.0}
- Net change: {change:+.0}
- Registered share: {ratio:.2}%

## Market
{price_line}
{oi_line}

## Delivery Notices (top dealers)
{dealers}

## Your Task
In at most 50 words, state what the main players appear to be doing
(e.g. squeezing shorts, distributing into strength, accumulating on dips).
Use one or two emoji. Reply with the note only."#,
        date   = record.report_date,
        reg    = stock.registered(),
        elig   = stock.eligible(),
        total  = stock.total(),
        change = stock.net_change(),
        ratio  = stock.registered_ratio() * 100.0,
        dealers = record.dealer_summary,
    )
}
