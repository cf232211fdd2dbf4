//! Institutional buy/sell streaks.

use crate::data::InstitutionalRow;

/// Signed streak for each trading day.
///
/// `days` yields the institutional row of every trading day in ascending
/// order, `None` where the day has no row. `+n`: the last `n` trading days
/// had foreign, trust and dealer all net buying. `-n`: all three net
/// selling. `0`: the day itself is mixed or flat. A day without a row has
/// no streak and breaks the run for the days after it.
///
/// A streak covering every available day counts at its full length.
pub fn streaks<'a, I>(days: I) -> Vec<Option<i64>>
where
    I: IntoIterator<Item = Option<&'a InstitutionalRow>>,
{
    let mut running: i64 = 0;

    days.into_iter()
        .map(|day| {
            let Some(row) = day else {
                running = 0;
                return None;
            };
            running = if row.all_buying() {
                running.max(0) + 1
            } else if row.all_selling() {
                running.min(0) - 1
            } else {
                0
            };
            Some(running)
        })
        .collect()
}
