use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use crate::ptzerror::{PTZError, PTZResult};

const FIELDS: [&str; 4] = ["time", "pan", "tilt", "zoom"];
/// Offsets past a year are rejected so deadlines stay representable.
pub const MAX_OFFSET_SECONDS: f64 = 365.0 * 24.0 * 3600.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoint {
  pub time_offset_seconds: f64,
  pub pan_degrees: f64,
  pub tilt_degrees: f64,
  pub zoom_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
  entries: Vec<Setpoint>,
}

impl Schedule {
  pub fn entries(&self) -> &[Setpoint] {
    &self.entries
  }
  pub fn len(&self) -> usize {
    self.entries.len()
  }
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// One data row keyed by header name.
pub type RawRow = HashMap<String, String>;

/// Split header-led comma separated text into rows. Blank lines are skipped,
/// extra columns are kept and later ignored.
pub fn read_rows(text: &str) -> Vec<RawRow> {
  let mut lines = text.lines()
    .map(|l| l.trim_start_matches('\u{feff}').trim())
    .filter(|l| !l.is_empty());
  let header: Vec<String> = match lines.next() {
    Some(h) => split_fields(h).map(|f| f.to_lowercase()).collect(),
    None => return Vec::new(),
  };
  lines.map(|line| {
    header.iter().cloned().zip(split_fields(line).map(str::to_string)).collect()
  }).collect()
}

fn split_fields(line: &str) -> impl Iterator<Item = &str> {
  line.split(',').map(|f| f.trim().trim_matches('"').trim())
}

fn field(row_no: usize, row: &RawRow, name: &str) -> PTZResult<f64> {
  let raw = row.get(name).filter(|v| !v.is_empty())
    .ok_or_else(|| PTZError::validation(row_no, format!("missing field `{}`", name)))?;
  match raw.parse::<f64>() {
    Ok(v) if v.is_finite() => Ok(v),
    _ => Err(PTZError::validation(row_no, format!("`{}` is not a number: {:?}", name, raw))),
  }
}

fn parse_row(row_no: usize, row: &RawRow) -> PTZResult<Setpoint> {
  Ok(Setpoint {
    time_offset_seconds: field(row_no, row, FIELDS[0])?,
    pan_degrees: field(row_no, row, FIELDS[1])?,
    tilt_degrees: field(row_no, row, FIELDS[2])?,
    zoom_ratio: field(row_no, row, FIELDS[3])?,
  })
}

/// Parse, validate and order rows. Fails on the first bad row (1-based);
/// no partial schedule is ever returned.
pub fn load(rows: &[RawRow]) -> PTZResult<Schedule> {
  let entries = rows.iter().enumerate()
    .map(|(i, row)| parse_row(i + 1, row))
    .collect::<PTZResult<Vec<_>>>()?;
  let mut schedule = validate(Schedule { entries })?;
  // stable: equal offsets keep their input order
  schedule.entries.sort_by(|a, b| a.time_offset_seconds.total_cmp(&b.time_offset_seconds));
  Ok(schedule)
}

/// Row numbers in errors follow the schedule's current entry order.
pub fn validate(schedule: Schedule) -> PTZResult<Schedule> {
  for (i, sp) in schedule.entries.iter().enumerate() {
    let values = [sp.time_offset_seconds, sp.pan_degrees, sp.tilt_degrees, sp.zoom_ratio];
    if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
      return Err(PTZError::validation(i + 1, format!("`{}` is not a number", FIELDS[pos])));
    }
    if sp.time_offset_seconds < 0.0 {
      return Err(PTZError::validation(i + 1,
        format!("negative time offset {}", sp.time_offset_seconds)));
    }
    if sp.time_offset_seconds > MAX_OFFSET_SECONDS {
      return Err(PTZError::validation(i + 1,
        format!("time offset {} is beyond {}s", sp.time_offset_seconds, MAX_OFFSET_SECONDS)));
    }
  }
  Ok(schedule)
}

pub async fn load_file(path: &Path) -> PTZResult<Schedule> {
  let text = fs::read_to_string(path).await?;
  load(&read_rows(&text))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn offsets(s: &Schedule) -> Vec<f64> {
    s.entries().iter().map(|e| e.time_offset_seconds).collect()
  }

  #[test]
  fn test_unordered_rows_are_sorted() {
    let rows = read_rows("time,pan,tilt,zoom\n5,10,0,1\n0,-10,5,2\n2,0,0,3\n");
    let s = load(&rows).unwrap();
    assert_eq!(offsets(&s), vec![0.0, 2.0, 5.0]);
    assert_eq!(s.entries()[0].pan_degrees, -10.0);
    assert_eq!(s.entries()[2].zoom_ratio, 1.0);
  }

  #[test]
  fn test_ties_keep_input_order() {
    let rows = read_rows("time,pan,tilt,zoom\n1,30,0,1\n0,0,0,1\n1,20,0,1\n1,10,0,1\n");
    let s = load(&rows).unwrap();
    let pans: Vec<f64> = s.entries().iter().map(|e| e.pan_degrees).collect();
    assert_eq!(pans, vec![0.0, 30.0, 20.0, 10.0]);
  }

  #[test]
  fn test_empty_input_is_empty_schedule() {
    assert!(load(&read_rows("")).unwrap().is_empty());
    assert!(load(&read_rows("time,pan,tilt,zoom\n")).unwrap().is_empty());
  }

  #[test]
  fn test_header_spacing_and_extra_columns() {
    let rows = read_rows("\u{feff}Time, Pan , tilt,zoom,label\n\n 1.5 , 45, -3 , 2.5, intro\n");
    let s = load(&rows).unwrap();
    assert_eq!(s.len(), 1);
    assert_eq!(s.entries()[0], Setpoint {
      time_offset_seconds: 1.5, pan_degrees: 45.0, tilt_degrees: -3.0, zoom_ratio: 2.5,
    });
  }

  #[test]
  fn test_missing_field_names_row() {
    let rows = read_rows("time,pan,tilt,zoom\n0,0,0,1\n1,0,0\n");
    match load(&rows) {
      Err(PTZError::Validation { row, reason }) => {
        assert_eq!(row, 2);
        assert!(reason.contains("zoom"));
      },
      other => panic!("expected validation error, got {:?}", other),
    }
  }

  #[test]
  fn test_non_numeric_fails_whole_load() {
    let rows = read_rows("time,pan,tilt,zoom\n0,0,0,1\n1,0,0,1\n2,left,0,1\n");
    match load(&rows) {
      Err(PTZError::Validation { row, reason }) => {
        assert_eq!(row, 3);
        assert!(reason.contains("pan"));
      },
      other => panic!("expected validation error, got {:?}", other),
    }
  }

  #[test]
  fn test_nan_is_not_a_number() {
    let rows = read_rows("time,pan,tilt,zoom\n0,nan,0,1\n");
    assert!(matches!(load(&rows), Err(PTZError::Validation { row: 1, .. })));
  }

  #[test]
  fn test_negative_offset_rejected() {
    let rows = read_rows("time,pan,tilt,zoom\n3,0,0,1\n-1,0,0,1\n");
    assert!(matches!(load(&rows), Err(PTZError::Validation { row: 2, .. })));
  }

  #[test]
  fn test_huge_offset_rejected() {
    let rows = read_rows("time,pan,tilt,zoom\n1e300,0,0,1\n");
    assert!(matches!(load(&rows), Err(PTZError::Validation { row: 1, .. })));
  }

  #[test]
  fn test_validate_passes_good_schedule() {
    let s = load(&read_rows("time,pan,tilt,zoom\n0,0,0,1\n")).unwrap();
    assert_eq!(validate(s.clone()).unwrap(), s);
  }

  #[tokio::test]
  async fn test_load_file() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, "time,pan,tilt,zoom\n2,1,2,3\n1,4,5,6\n").unwrap();
    let s = load_file(f.path()).await.unwrap();
    assert_eq!(offsets(&s), vec![1.0, 2.0]);
  }

  #[tokio::test]
  async fn test_load_missing_file_is_io_error() {
    let r = load_file(Path::new("/nonexistent/schedule.csv")).await;
    assert!(matches!(r, Err(PTZError::Io(_))));
  }
}
