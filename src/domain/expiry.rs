//! Front-month expiry rules for the supported commodity futures.
//!
//! Business days exclude weekends only; exchange holidays are ignored.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use super::error::ChaintraderError;

/// Business days before a CBOT expiry at which positions roll forward.
const CBOT_ROLL_BUSINESS_DAYS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FuturesContract {
    CrudeOilWti,
    CrudeOilBrent,
    NaturalGas,
    HeatingOil,
    Soybeans,
    Wheat,
    Corn,
    Cocoa,
}

impl FuturesContract {
    pub const SUPPORTED_SYMBOLS: [&'static str; 8] = [
        "CL=F", "BZ=F", "NG=F", "HO=F", "ZS=F", "ZW=F", "ZC=F", "CC=F",
    ];

    pub fn from_symbol(symbol: &str) -> Result<Self, ChaintraderError> {
        match symbol.trim().to_uppercase().as_str() {
            "CL=F" => Ok(FuturesContract::CrudeOilWti),
            "BZ=F" => Ok(FuturesContract::CrudeOilBrent),
            "NG=F" => Ok(FuturesContract::NaturalGas),
            "HO=F" => Ok(FuturesContract::HeatingOil),
            "ZS=F" => Ok(FuturesContract::Soybeans),
            "ZW=F" => Ok(FuturesContract::Wheat),
            "ZC=F" => Ok(FuturesContract::Corn),
            "CC=F" => Ok(FuturesContract::Cocoa),
            _ => Err(ChaintraderError::UnsupportedContract {
                symbol: symbol.to_string(),
            }),
        }
    }

    /// Listed delivery months for the CBOT grains and cocoa.
    fn cbot_months(self) -> Option<&'static [u32]> {
        match self {
            FuturesContract::Soybeans => Some(&[1, 3, 5, 7, 8, 9, 11]),
            FuturesContract::Wheat | FuturesContract::Corn | FuturesContract::Cocoa => {
                Some(&[3, 5, 7, 9, 12])
            }
            _ => None,
        }
    }

    /// Last trading day of the energy contract delivering in
    /// `delivery_year`/`delivery_month`.
    fn energy_expiry(self, delivery_year: i32, delivery_month: u32) -> NaiveDate {
        let (prev_year, prev_month) = previous_month(delivery_year, delivery_month);
        match self {
            FuturesContract::CrudeOilWti => subtract_business_days(ymd(prev_year, prev_month, 25), 3),
            FuturesContract::CrudeOilBrent => {
                subtract_business_days(ymd(delivery_year, delivery_month, 1), 2)
            }
            FuturesContract::NaturalGas => {
                subtract_business_days(ymd(delivery_year, delivery_month, 1), 3)
            }
            _ => subtract_business_days(ymd(prev_year, prev_month, 1), 1),
        }
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 { (year + 1, 1) } else { (year, month + 1) }
}

fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 { (year - 1, 12) } else { (year, month - 1) }
}

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Step back `count` weekdays. A weekend start counts its preceding Friday
/// as the first step.
pub fn subtract_business_days(date: NaiveDate, count: u32) -> NaiveDate {
    let mut current = date;
    let mut remaining = count;
    while remaining > 0 {
        current -= Duration::days(1);
        if is_business_day(current) {
            remaining -= 1;
        }
    }
    current
}

fn cbot_expiry(year: i32, month: u32) -> NaiveDate {
    subtract_business_days(ymd(year, month, 15), 1)
}

/// Expiry of the front-month contract for `symbol` as seen on `as_of`.
///
/// Energy contracts start from the next delivery month and roll one month
/// further if that contract has already expired. CBOT contracts take the
/// next listed month and roll to the following one once `as_of` is within
/// the roll window before expiry.
pub fn front_month_expiry(symbol: &str, as_of: NaiveDate) -> Result<NaiveDate, ChaintraderError> {
    let contract = FuturesContract::from_symbol(symbol)?;

    if let Some(months) = contract.cbot_months() {
        let (mut year, mut index) = match months.iter().position(|m| *m >= as_of.month()) {
            Some(i) => (as_of.year(), i),
            None => (as_of.year() + 1, 0),
        };

        let expiry = cbot_expiry(year, months[index]);
        let roll_date = subtract_business_days(expiry, CBOT_ROLL_BUSINESS_DAYS);
        if as_of < roll_date {
            return Ok(expiry);
        }

        index += 1;
        if index >= months.len() {
            index = 0;
            year += 1;
        }
        return Ok(cbot_expiry(year, months[index]));
    }

    let (year, month) = next_month(as_of.year(), as_of.month());
    let expiry = contract.energy_expiry(year, month);
    if expiry >= as_of {
        return Ok(expiry);
    }
    let (year, month) = next_month(year, month);
    Ok(contract.energy_expiry(year, month))
}
