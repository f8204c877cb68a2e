//! Timer summaries in table, csv, tsv, json and yaml form.

use crate::error::MmbenchError;
use crate::timer::{Metric, Statistic, Timer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

const LABEL_WIDTH: usize = 24;
const VALUE_WIDTH: usize = 16;

const FULL_STATISTICS: &[Statistic] = &Statistic::ALL;
const LAST_VALUE_ONLY: &[Statistic] = &[Statistic::LastValue];

/// Output format for [`Timer::summarize`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    Tsv,
    Json,
    Yaml,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Table,
        OutputFormat::Csv,
        OutputFormat::Tsv,
        OutputFormat::Json,
        OutputFormat::Yaml,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Csv => "csv",
            OutputFormat::Tsv => "tsv",
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        }
    }

    /// All format names joined with `|`, for help text.
    pub fn names() -> String {
        Self::ALL.map(Self::name).join("|")
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = MmbenchError;

    /// Case-insensitive; the empty string selects [`OutputFormat::Table`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(OutputFormat::Table);
        }
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                MmbenchError::Config(format!(
                    "unknown output format '{s}' (expected {})",
                    Self::names()
                ))
            })
    }
}

impl Timer {
    /// Write every metric's statistics to `sink`.
    ///
    /// With fewer than two cycles only the last value is written.
    pub fn summarize<W: Write>(
        &self,
        format: OutputFormat,
        label: Option<&str>,
        sink: &mut W,
    ) -> io::Result<()> {
        match format {
            OutputFormat::Table => write_table(self, label, sink),
            OutputFormat::Csv => write_delimited(self, label, ',', sink),
            OutputFormat::Tsv => write_delimited(self, label, '\t', sink),
            OutputFormat::Json => {
                let view = Summary { timer: self, label };
                serde_json::to_writer(&mut *sink, &view)?;
                writeln!(sink)
            }
            OutputFormat::Yaml => {
                let view = Summary { timer: self, label };
                serde_yaml::to_writer(sink, &view).map_err(io::Error::other)
            }
        }
    }

    /// Render a summary into a `String`.
    pub fn summary_string(&self, format: OutputFormat, label: Option<&str>) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec only fails on serializer errors, which the
        // summary views never raise.
        let _ = self.summarize(format, label, &mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn reported_statistics(&self) -> &'static [Statistic] {
        if self.has_statistics() {
            FULL_STATISTICS
        } else {
            LAST_VALUE_ONLY
        }
    }
}

fn write_table<W: Write>(timer: &Timer, label: Option<&str>, sink: &mut W) -> io::Result<()> {
    let stats = timer.reported_statistics();

    write!(sink, "{:>LABEL_WIDTH$.LABEL_WIDTH$}", label.unwrap_or(""))?;
    for stat in stats {
        write!(sink, " {:>VALUE_WIDTH$.VALUE_WIDTH$}", stat.heading())?;
    }
    writeln!(sink)?;

    write!(sink, "{}", "-".repeat(LABEL_WIDTH))?;
    for _ in stats {
        write!(sink, " {}", "-".repeat(VALUE_WIDTH))?;
    }
    writeln!(sink)?;

    for metric in Metric::ALL {
        write!(sink, "{:>LABEL_WIDTH$}", metric.label())?;
        for stat in stats {
            write!(sink, " {:>VALUE_WIDTH$}", format_general(timer.value(metric, *stat)))?;
        }
        writeln!(sink)?;
    }
    Ok(())
}

fn write_delimited<W: Write>(
    timer: &Timer,
    label: Option<&str>,
    delim: char,
    sink: &mut W,
) -> io::Result<()> {
    let stats = timer.reported_statistics();

    write!(sink, "{}", quoted(label.unwrap_or("")))?;
    for stat in stats {
        write!(sink, "{delim}{}", quoted(stat.heading()))?;
    }
    writeln!(sink)?;

    for metric in Metric::ALL {
        write!(sink, "{}", quoted(metric.label()))?;
        for stat in stats {
            write!(sink, "{delim}{}", format_general(timer.value(metric, *stat)))?;
        }
        writeln!(sink)?;
    }
    Ok(())
}

/// Double-quoted field with embedded quotes doubled.
fn quoted(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Shortest-form number with six significant digits, like C's `%g`.
pub fn format_general(value: f64) -> String {
    const PRECISION: i32 = 6;

    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.into();
    }
    if value == 0.0 {
        return "0".into();
    }

    // Scientific rendering settles the exponent after rounding.
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);

    if exp < -4 || exp >= PRECISION {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exp.abs())
    } else {
        let decimals = (PRECISION - 1 - exp).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Serialization view shared by the json and yaml formats.
struct Summary<'a> {
    timer: &'a Timer,
    label: Option<&'a str>,
}

struct MetricMap<'a>(&'a Timer);

struct StatisticMap<'a> {
    timer: &'a Timer,
    metric: Metric,
}

impl Serialize for Summary<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let metrics = MetricMap(self.timer);
        match self.label {
            Some(label) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(label, &metrics)?;
                map.end()
            }
            None => metrics.serialize(serializer),
        }
    }
}

impl Serialize for MetricMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Metric::ALL.len()))?;
        for metric in Metric::ALL {
            map.serialize_entry(
                metric.label(),
                &StatisticMap {
                    timer: self.0,
                    metric,
                },
            )?;
        }
        map.end()
    }
}

impl Serialize for StatisticMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let stats = self.timer.reported_statistics();
        let mut map = serializer.serialize_map(Some(stats.len()))?;
        for stat in stats {
            map.serialize_entry(stat.key(), &self.timer.value(self.metric, *stat))?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{MetricValues, METRIC_COUNT};

    fn timer_with(samples: &[f64]) -> Timer {
        let mut timer = Timer::new();
        for v in samples {
            let values: MetricValues = [*v; METRIC_COUNT];
            timer.record(values);
        }
        timer
    }

    #[test]
    fn should_parse_formats_case_insensitively() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("Tsv".parse::<OutputFormat>().unwrap(), OutputFormat::Tsv);
        assert_eq!("".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert!("xml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::names(), "table|csv|tsv|json|yaml");
    }

    #[test]
    fn should_format_like_c_general_notation() {
        assert_eq!(format_general(1.0), "1");
        assert_eq!(format_general(0.5), "0.5");
        assert_eq!(format_general(1.41421356), "1.41421");
        assert_eq!(format_general(123456.0), "123456");
        assert_eq!(format_general(1234567.0), "1.23457e+06");
        assert_eq!(format_general(0.0001), "0.0001");
        assert_eq!(format_general(0.00001234), "1.234e-05");
        assert_eq!(format_general(-2.5), "-2.5");
        assert_eq!(format_general(f64::INFINITY), "inf");
    }

    #[test]
    fn should_write_full_table_with_statistics() {
        let out = timer_with(&[2.0, 4.0]).summary_string(OutputFormat::Table, Some("multiply"));
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 2 + METRIC_COUNT);
        assert!(lines[0].trim_start().starts_with("multiply"));
        assert!(lines[0].ends_with("std deviation"));
        assert!(lines[1].starts_with(&"-".repeat(LABEL_WIDTH)));
        assert!(lines[2].trim_start().starts_with("Walltime"));
        assert_eq!(lines[2].split_whitespace().collect::<Vec<_>>()[1..], ["4", "2", "4", "3", "2", "1.41421"]);
    }

    #[test]
    fn should_write_last_value_only_without_statistics() {
        let out = timer_with(&[7.0]).summary_string(OutputFormat::Csv, None);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "\"\",\"last value\"");
        assert_eq!(lines[1], "\"Walltime\",7");
        assert_eq!(lines.len(), 1 + METRIC_COUNT);
    }

    #[test]
    fn should_double_quotes_inside_delimited_labels() {
        let out = timer_with(&[1.0]).summary_string(OutputFormat::Csv, Some("init (file=\"a b\")"));
        assert_eq!(out.lines().next().unwrap(), "\"init (file=\"\"a b\"\")\",\"last value\"");
    }

    #[test]
    fn should_delimit_tsv_with_tabs() {
        let out = timer_with(&[1.0, 1.0]).summary_string(OutputFormat::Tsv, Some("init"));
        let header = out.lines().next().unwrap();
        assert_eq!(header.split('\t').count(), 7);
        assert!(header.starts_with("\"init\"\t\"last value\""));
    }

    #[test]
    fn should_nest_json_under_label() {
        let out = timer_with(&[2.0, 4.0]).summary_string(OutputFormat::Json, Some("multiply"));
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();

        let walltime = &value["multiply"]["Walltime"];
        assert_eq!(walltime["average"], 3.0);
        assert_eq!(walltime["variance"], 2.0);
        assert_eq!(walltime["last-value"], 4.0);

        let keys: Vec<&String> = value["multiply"].as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), METRIC_COUNT);
    }

    #[test]
    fn should_render_unavailable_json_values_as_null() {
        let out = Timer::new().summary_string(OutputFormat::Json, None);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(value["Walltime"]["last-value"].is_null());
        assert!(value["Walltime"].get("average").is_none());
    }

    #[test]
    fn should_indent_yaml_metrics_under_label() {
        let out = timer_with(&[1.0, 3.0]).summary_string(OutputFormat::Yaml, Some("init"));
        assert!(out.starts_with("init:\n"));

        let value: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        let avg = &value["init"]["rusage.ru_maxrss"]["average"];
        assert_eq!(avg.as_f64(), Some(2.0));
    }
}
