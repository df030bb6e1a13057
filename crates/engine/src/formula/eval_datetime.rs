// Date functions: TODAY, DATE, YEAR, MONTH, DAY
//
// Dates are serial numbers in the 1900 date system: serial 1 is 1900-01-01
// and serial 60 is the nonexistent 1900-02-29 kept for compatibility.

use chrono::{Datelike, Duration, Local, NaiveDate};

use super::eval::{arg_number, check_arity, CellLookup, Value, NUM};
use super::parser::Expr;

pub(crate) fn try_evaluate<L: CellLookup>(name: &str, args: &[Expr], lookup: &L) -> Option<Value> {
    let result = match name {
        "TODAY" => check_arity(args, 0, 0).map(|_| Value::Number(date_to_serial(Local::now().date_naive()))),
        "DATE" => date(args, lookup),
        "YEAR" | "MONTH" | "DAY" => date_part(name, args, lookup),
        _ => return None,
    };
    Some(result.unwrap_or_else(Value::Error))
}

// DATE(year, month, day) - month and day overflow roll into the next unit
fn date<L: CellLookup>(args: &[Expr], lookup: &L) -> Result<Value, String> {
    check_arity(args, 3, 3)?;
    let mut year = arg_number(args, 0, lookup)?.trunc() as i64;
    let month = arg_number(args, 1, lookup)?.trunc() as i64;
    let day = arg_number(args, 2, lookup)?.trunc() as i64;
    if (0..1900).contains(&year) {
        year += 1900;
    }
    if !(0..=9999).contains(&year) || !(-120_000..=120_000).contains(&month) {
        return Err(NUM.to_string());
    }

    let months = year * 12 + (month - 1);
    let (y, m) = (months.div_euclid(12), months.rem_euclid(12) + 1);
    let first = i32::try_from(y)
        .ok()
        .and_then(|y| NaiveDate::from_ymd_opt(y, m as u32, 1))
        .ok_or_else(|| NUM.to_string())?;
    let date = Duration::try_days(day.saturating_sub(1))
        .and_then(|offset| first.checked_add_signed(offset))
        .ok_or_else(|| NUM.to_string())?;

    let serial = date_to_serial(date);
    if serial < 0.0 {
        return Err(NUM.to_string());
    }
    Ok(Value::Number(serial))
}

fn date_part<L: CellLookup>(name: &str, args: &[Expr], lookup: &L) -> Result<Value, String> {
    check_arity(args, 1, 1)?;
    let serial = arg_number(args, 0, lookup)?;
    let (y, m, d) = serial_to_ymd(serial).ok_or_else(|| NUM.to_string())?;
    let part = match name {
        "YEAR" => y as f64,
        "MONTH" => m as f64,
        _ => d as f64,
    };
    Ok(Value::Number(part))
}

fn epoch() -> NaiveDate {
    // 1899-12-30 always exists
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or(NaiveDate::MIN)
}

pub(crate) fn date_to_serial(date: NaiveDate) -> f64 {
    let days = (date - epoch()).num_days();
    // Dates before the phantom 1900-02-29 sit one lower
    if days < 61 {
        (days - 1) as f64
    } else {
        days as f64
    }
}

pub(crate) fn serial_to_ymd(serial: f64) -> Option<(i32, u32, u32)> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let serial = serial.floor() as i64;
    match serial {
        0 => Some((1900, 1, 0)),
        60 => Some((1900, 2, 29)),
        s => {
            let offset = if s < 60 { s + 1 } else { s };
            let date = epoch().checked_add_signed(Duration::try_days(offset)?)?;
            Some((date.year(), date.month(), date.day()))
        }
    }
}
