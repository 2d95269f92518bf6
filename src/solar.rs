//! NOAA sunrise/sunset calculation.
//!
//! Julian day -> Julian century -> geometric mean longitude/anomaly ->
//! equation of center -> apparent longitude -> declination -> hour angle.
//! Accurate to about a minute away from the poles, which is all an LED
//! strip needs when the astronomy service is unreachable.

use std::f64::consts::PI;

use chrono::{Datelike, Local, NaiveDate, Offset, TimeZone};

fn deg2rad(d: f64) -> f64 {
    d * PI / 180.0
}

fn rad2deg(r: f64) -> f64 {
    r * 180.0 / PI
}

/// Julian Day from a calendar date and fractional hour (UTC)
fn julian_day(year: i32, month: i32, day: i32, hour_frac: f64) -> f64 {
    let (y, m) = if month <= 2 {
        (year - 1, month + 12)
    } else {
        (year, month)
    };

    let a = y / 100;
    let b = 2 - a + a / 4;

    let jd = (365.25 * (y + 4716) as f64).floor()
        + (30.6001 * (m + 1) as f64).floor()
        + day as f64
        + b as f64
        - 1524.5;
    jd + hour_frac / 24.0
}

struct SolarParams {
    sun_declin: f64, // deg
    eq_time: f64,    // minutes
}

fn compute_solar_params(jc: f64) -> SolarParams {
    let l0 = (280.46646 + jc * (36000.76983 + 0.0003032 * jc)) % 360.0;
    let m = 357.52911 + jc * (35999.05029 - 0.0001537 * jc);
    let m_rad = deg2rad(m);
    let e = 0.016708634 - jc * (0.000042037 + 0.0000001267 * jc);

    // equation of center
    let c = m_rad.sin() * (1.914602 - jc * (0.004817 + 0.000014 * jc))
        + (2.0 * m_rad).sin() * (0.019993 - 0.000101 * jc)
        + (3.0 * m_rad).sin() * 0.000289;

    let sun_lon = l0 + c;
    let omega = 125.04 - 1934.136 * jc;
    let sun_apparent_lon = sun_lon - 0.00569 - 0.00478 * deg2rad(omega).sin();

    let obliq_mean = 23.0
        + (26.0 + (21.448 - jc * (46.815 + jc * (0.00059 - jc * 0.001813))) / 60.0) / 60.0;
    let obliq_corr = obliq_mean + 0.00256 * deg2rad(omega).cos();
    let obliq_corr_rad = deg2rad(obliq_corr);

    let sun_declin = rad2deg((obliq_corr_rad.sin() * deg2rad(sun_apparent_lon).sin()).asin());

    let var_y = (obliq_corr_rad / 2.0).tan().powi(2);
    let eq_time = 4.0
        * rad2deg(
            var_y * (2.0 * deg2rad(l0)).sin() - 2.0 * e * m_rad.sin()
                + 4.0 * e * var_y * m_rad.sin() * (2.0 * deg2rad(l0)).cos()
                - 0.5 * var_y * var_y * (4.0 * deg2rad(l0)).sin()
                - 1.25 * e * e * (2.0 * m_rad).sin(),
        );

    SolarParams {
        sun_declin,
        eq_time,
    }
}

/// Local sunrise and sunset in fractional hours for `date`.
///
/// `utc_offset_hours` is the local offset east of UTC. Returns `None` when
/// the sun does not cross the horizon that day.
pub fn sunrise_sunset(
    date: NaiveDate,
    utc_offset_hours: f64,
    lat: f64,
    lon: f64,
) -> Option<(f64, f64)> {
    let jd = julian_day(date.year(), date.month() as i32, date.day() as i32, 12.0);
    let jc = (jd - 2451545.0) / 36525.0;
    let sp = compute_solar_params(jc);

    // zenith 90.833 accounts for refraction and the solar disc
    let zenith = 90.833_f64;
    let lat_rad = deg2rad(lat);
    let declin_rad = deg2rad(sp.sun_declin);

    let cos_ha = deg2rad(zenith).cos() / (lat_rad.cos() * declin_rad.cos())
        - lat_rad.tan() * declin_rad.tan();

    if !(-1.0..=1.0).contains(&cos_ha) {
        return None;
    }

    let ha = rad2deg(cos_ha.acos());

    let sunrise_min = 720.0 - 4.0 * (lon + ha) - sp.eq_time + utc_offset_hours * 60.0;
    let sunset_min = 720.0 - 4.0 * (lon - ha) - sp.eq_time + utc_offset_hours * 60.0;

    Some((sunrise_min / 60.0, sunset_min / 60.0))
}

/// Offset of the system local time zone at noon on `date`, in hours
pub fn local_offset_hours(date: NaiveDate) -> f64 {
    let Some(noon) = date.and_hms_opt(12, 0, 0) else {
        return 0.0;
    };
    Local
        .from_local_datetime(&noon)
        .earliest()
        .map(|dt| dt.offset().fix().local_minus_utc() as f64 / 3600.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greenwich_equinox_is_near_six_and_six() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();
        let (rise, set) = sunrise_sunset(date, 0.0, 51.4769, 0.0).unwrap();
        // about 06:01 and 18:13 UTC
        assert!((rise - 6.02).abs() < 0.1, "sunrise {rise}");
        assert!((set - 18.23).abs() < 0.1, "sunset {set}");
    }

    #[test]
    fn offset_shifts_both_events() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 21).unwrap();
        let (rise_utc, set_utc) = sunrise_sunset(date, 0.0, 40.71, -74.0).unwrap();
        let (rise, set) = sunrise_sunset(date, -4.0, 40.71, -74.0).unwrap();
        assert!((rise_utc - 4.0 - rise).abs() < 1e-9);
        assert!((set_utc - 4.0 - set).abs() < 1e-9);
        // New York solstice: about 05:25 and 20:31 EDT
        assert!((rise - 5.42).abs() < 0.1, "sunrise {rise}");
        assert!((set - 20.52).abs() < 0.1, "sunset {set}");
    }

    #[test]
    fn polar_night_has_no_window() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 21).unwrap();
        assert!(sunrise_sunset(date, 1.0, 78.22, 15.65).is_none());
    }
}
