use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Gateway-reported production of one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEnergy {
    pub date: NaiveDate,
    pub energy_wh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    /// Local date the summary was computed for
    pub today: NaiveDate,
    pub today_kwh: Option<f64>,
    pub yesterday_kwh: Option<f64>,
    pub last_7_days_kwh: f64,
    /// Up to the last seven days, oldest first
    pub days: Vec<DailyEnergy>,
}

pub struct EnergyHistory;

impl EnergyHistory {
    /// Summarize a daily history by date.
    ///
    /// Entries are matched on their date, never on their position: "today" is the
    /// entry dated `today`, "yesterday" the one dated `today - 1`. The seven-day sum
    /// covers `today - 6 ..= today`, so missing days count as nothing.
    pub fn summarize(mut entries: Vec<DailyEnergy>, today: NaiveDate) -> HistorySummary {
        entries.sort_by_key(|e| e.date);
        entries.dedup_by_key(|e| e.date);

        let yesterday = today - Duration::days(1);
        let week_start = today - Duration::days(6);

        let find = |date: NaiveDate| {
            entries
                .iter()
                .find(|e| e.date == date)
                .map(|e| e.energy_wh / 1000.0)
        };

        let days: Vec<DailyEnergy> = entries
            .iter()
            .filter(|e| e.date >= week_start && e.date <= today)
            .cloned()
            .collect();
        let last_7_days_kwh = days.iter().map(|e| e.energy_wh).sum::<f64>() / 1000.0;

        HistorySummary {
            today,
            today_kwh: find(today),
            yesterday_kwh: find(yesterday),
            last_7_days_kwh,
            days,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32, wh: f64) -> DailyEnergy {
        DailyEnergy {
            date: NaiveDate::from_ymd_opt(2024, 5, d).unwrap(),
            energy_wh: wh,
        }
    }

    #[test]
    fn test_today_and_yesterday_by_date() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let summary = EnergyHistory::summarize(vec![day(8, 1000.0), day(9, 2000.0), day(10, 500.0)], today);
        assert_eq!(summary.today_kwh, Some(0.5));
        assert_eq!(summary.yesterday_kwh, Some(2.0));
    }

    #[test]
    fn test_history_without_today_entry() {
        // Early morning: the gateway has not opened today's row yet
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let summary = EnergyHistory::summarize(vec![day(8, 1000.0), day(9, 2000.0)], today);
        assert_eq!(summary.today_kwh, None);
        assert_eq!(summary.yesterday_kwh, Some(2.0));
    }

    #[test]
    fn test_last_seven_days_window() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let entries = (1..=10).map(|d| day(d, 1000.0)).collect();
        let summary = EnergyHistory::summarize(entries, today);
        assert_eq!(summary.days.len(), 7);
        assert_eq!(summary.days.first().map(|e| e.date.to_string()), Some("2024-05-04".to_string()));
        assert_eq!(summary.days.last().map(|e| e.date.to_string()), Some("2024-05-10".to_string()));
        assert!((summary.last_7_days_kwh - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_unordered_input_is_sorted() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        let summary = EnergyHistory::summarize(vec![day(3, 300.0), day(1, 100.0), day(2, 200.0)], today);
        let dates: Vec<u32> = summary.days.iter().map(|e| chrono::Datelike::day(&e.date)).collect();
        assert_eq!(dates, vec![1, 2, 3]);
        assert_eq!(summary.yesterday_kwh, Some(0.2));
    }
}
