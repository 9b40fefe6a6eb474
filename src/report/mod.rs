mod export;

pub use export::{CSV_FILE_NAME, csv_string, render_html_table, render_text_table, write_csv};

use crate::error::InputError;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Language {
    #[default]
    English,
    Swedish,
}

/// User-facing strings for one language.
#[derive(Debug)]
pub struct Labels {
    pub language: &'static str,
    pub title: &'static str,
    pub csi_score: &'static str,
    pub sample_size: &'static str,
    pub ownership_duration: &'static str,
    pub warranty_duration: &'static str,
    pub vehicle_profit: &'static str,
    pub service_profit: &'static str,
    pub run: &'static str,
    pub results: &'static str,
    pub year: &'static str,
    pub service_customers: &'static str,
    pub repeat_purchases: &'static str,
    pub total_profit: &'static str,
    pub total: &'static str,
    pub download: &'static str,
}

const ENGLISH: Labels = Labels {
    language: "Language",
    title: "CSI Profitability Simulator",
    csi_score: "CSI score (out of 1,000)",
    sample_size: "Sample size (Volvo Selekt sales)",
    ownership_duration: "Ownership duration (years)",
    warranty_duration: "Volvo Selekt warranty (years)",
    vehicle_profit: "Vehicle sale profit",
    service_profit: "Service profit per year per customer",
    run: "Run simulation",
    results: "Results",
    year: "Year",
    service_customers: "Service customers",
    repeat_purchases: "Repeat purchases",
    total_profit: "Total profit",
    total: "Total",
    download: "Download CSV",
};

const SWEDISH: Labels = Labels {
    language: "Språk",
    title: "CSI Lönsamhetssimulator",
    csi_score: "CSI-poäng (av 1 000)",
    sample_size: "Volvo Selekt-försäljning",
    ownership_duration: "Ägarperiod (år)",
    warranty_duration: "Volvo Selekt-garanti (år)",
    vehicle_profit: "Vinst per bilförsäljning",
    service_profit: "Servicevinst per kund och år",
    run: "Kör simulering",
    results: "Resultat",
    year: "År",
    service_customers: "Servicekunder",
    repeat_purchases: "Återköp",
    total_profit: "Total vinst",
    total: "Totalt",
    download: "Ladda ner CSV",
};

impl Language {
    pub fn labels(self) -> &'static Labels {
        match self {
            Language::English => &ENGLISH,
            Language::Swedish => &SWEDISH,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Swedish => "svenska",
        }
    }

    fn group_separator(self) -> char {
        match self {
            Language::English => ',',
            Language::Swedish => ' ',
        }
    }
}

/// Groups digits in threes: `1,234,567` in English, `1 234 567` in Swedish.
pub fn format_number(value: i64, language: Language) -> String {
    let digits = value.unsigned_abs().to_string();
    let separator = language.group_separator();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(separator);
        }
        out.push(ch);
    }
    out
}

/// Reads a whole number typed in either locale. Spaces, non-breaking spaces,
/// commas and dots are all treated as grouping and dropped.
pub fn parse_number(text: &str, flag: &'static str) -> Result<i64, InputError> {
    let cleaned = text
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{00a0}' | '\u{202f}' | ',' | '.'))
        .collect::<String>();
    cleaned.parse::<i64>().map_err(|_| InputError::NotANumber {
        flag,
        text: text.to_string(),
    })
}
