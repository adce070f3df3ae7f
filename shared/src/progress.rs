/// Progress reporter: turns raw engine telemetry into display-ready fields.
use crate::engine::FetchEvent;
use crate::errors::ProgressError;
use crate::models::JobUpdate;

const SPEED_UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];

/// Format a transfer rate, e.g. `"3.4 MB/s"`. Absent or zero rates render empty.
pub fn format_speed(bytes_per_sec: Option<f64>) -> String {
    let mut value = match bytes_per_sec {
        Some(v) if v != 0.0 => v,
        _ => return String::new(),
    };

    let mut unit = 0;
    while value >= 1024.0 && unit < SPEED_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, SPEED_UNITS[unit])
}

/// Whole percentage of `downloaded` over `total`, floored and capped at 100.
/// Unknown or zero totals give 0.
pub fn percent(downloaded: u64, total: Option<u64>) -> Result<u8, ProgressError> {
    let total = match total {
        Some(t) if t > 0 => t,
        _ => return Ok(0),
    };
    let scaled = downloaded
        .checked_mul(100)
        .ok_or(ProgressError::Overflow(downloaded))?;
    Ok((scaled / total).min(100) as u8)
}

/// Translate one engine event into the registry update it implies.
pub fn interpret(event: &FetchEvent) -> Result<JobUpdate, ProgressError> {
    match event {
        FetchEvent::Downloading {
            downloaded_bytes,
            total_bytes,
            speed,
            eta,
        } => {
            if let Some(s) = speed {
                if !s.is_finite() || *s < 0.0 {
                    return Err(ProgressError::InvalidSpeed(*s));
                }
            }
            let eta = match eta {
                Some(e) if !e.is_finite() || *e < 0.0 => return Err(ProgressError::InvalidEta(*e)),
                Some(e) => Some(e.round() as u64),
                None => None,
            };
            Ok(JobUpdate::Downloading {
                percent: percent(*downloaded_bytes, *total_bytes)?,
                eta,
                speed: format_speed(*speed),
            })
        }
        FetchEvent::Finished => Ok(JobUpdate::PostProcessing),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_speed_ladder() {
        assert_eq!(format_speed(None), "");
        assert_eq!(format_speed(Some(0.0)), "");
        assert_eq!(format_speed(Some(500.0)), "500.0 B/s");
        assert_eq!(format_speed(Some(2048.0)), "2.0 KB/s");
        assert_eq!(format_speed(Some(5.0 * 1024.0 * 1024.0)), "5.0 MB/s");
        assert_eq!(format_speed(Some(3.4 * 1024.0 * 1024.0)), "3.4 MB/s");
    }

    #[test]
    fn test_format_speed_caps_at_gigabytes() {
        let tera = 1024.0_f64.powi(4);
        assert_eq!(format_speed(Some(tera)), "1024.0 GB/s");
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, Some(100)), Ok(0));
        assert_eq!(percent(1, Some(3)), Ok(33));
        assert_eq!(percent(512, Some(1024)), Ok(50));
        assert_eq!(percent(50, None), Ok(0));
        assert_eq!(percent(50, Some(0)), Ok(0));
        // Estimates can undershoot the real size.
        assert_eq!(percent(2000, Some(1000)), Ok(100));
        assert_eq!(percent(u64::MAX, Some(10)), Err(ProgressError::Overflow(u64::MAX)));
    }

    #[test]
    fn test_interpret_downloading() {
        let event = FetchEvent::Downloading {
            downloaded_bytes: 256,
            total_bytes: Some(1024),
            speed: Some(2048.0),
            eta: Some(3.6),
        };
        assert_eq!(
            interpret(&event),
            Ok(JobUpdate::Downloading { percent: 25, eta: Some(4), speed: "2.0 KB/s".into() })
        );
    }

    #[test]
    fn test_interpret_rejects_bad_telemetry() {
        let event = FetchEvent::Downloading {
            downloaded_bytes: 1,
            total_bytes: Some(2),
            speed: None,
            eta: Some(f64::NAN),
        };
        assert!(matches!(interpret(&event), Err(ProgressError::InvalidEta(_))));

        let event = FetchEvent::Downloading {
            downloaded_bytes: 1,
            total_bytes: Some(2),
            speed: Some(-1.0),
            eta: None,
        };
        assert_eq!(interpret(&event), Err(ProgressError::InvalidSpeed(-1.0)));
    }

    #[test]
    fn test_interpret_finished() {
        assert_eq!(interpret(&FetchEvent::Finished), Ok(JobUpdate::PostProcessing));
    }
}
