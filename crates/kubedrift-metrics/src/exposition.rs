//! Prometheus text exposition decoder.
//!
//! Turns one scrape body into metric samples, one metric family
//! ("vector") at a time. The decoder is a lazy, single-pass iterator:
//!
//! ```text
//! # HELP container_cpu_usage_seconds_total Cumulative cpu time consumed
//! # TYPE container_cpu_usage_seconds_total counter
//! container_cpu_usage_seconds_total{container="app",pod="web-0"} 12.5 1700000000000
//! ```
//!
//! A malformed line yields one error and ends the iteration. Callers that
//! need all-or-nothing semantics use [`decode`].

use std::collections::{BTreeMap, HashMap};
use std::str::SplitInclusive;

use crate::error::{DecodeError, DecodeResult};
use crate::sample::MetricSample;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl MetricType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "counter" => Some(Self::Counter),
            "gauge" => Some(Self::Gauge),
            "histogram" => Some(Self::Histogram),
            "summary" => Some(Self::Summary),
            "untyped" => Some(Self::Untyped),
            _ => None,
        }
    }

    /// Sample-name suffixes that fold into a family of this type.
    fn member_suffixes(self) -> &'static [&'static str] {
        match self {
            Self::Histogram => &["_bucket", "_sum", "_count"],
            Self::Summary => &["_sum", "_count"],
            _ => &[],
        }
    }
}

#[derive(Debug, Default)]
struct FamilyMeta {
    kind: Option<MetricType>,
    has_help: bool,
    has_samples: bool,
}

/// Lazy decoder over one scrape body.
pub struct Decoder<'a> {
    lines: Option<SplitInclusive<'a, char>>,
    line_no: usize,
    default_timestamp_ms: i64,
    families: HashMap<String, FamilyMeta>,
    current: Option<String>,
    pending: Vec<MetricSample>,
    done: bool,
}

impl<'a> Decoder<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        Self {
            lines: std::str::from_utf8(body)
                .ok()
                .map(|text| text.split_inclusive('\n')),
            line_no: 0,
            default_timestamp_ms: 0,
            families: HashMap::new(),
            current: None,
            pending: Vec::new(),
            done: false,
        }
    }

    /// Timestamp applied to samples that carry none (usually the scrape time).
    pub fn with_default_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.default_timestamp_ms = timestamp_ms;
        self
    }

    fn error(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::Syntax {
            line: self.line_no,
            reason: reason.into(),
        }
    }

    fn flush(&mut self) -> Option<Vec<MetricSample>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    /// Make `family` the current vector, handing back the previous one.
    fn switch_to(&mut self, family: &str) -> Option<Vec<MetricSample>> {
        if self.current.as_deref() == Some(family) {
            return None;
        }
        self.current = Some(family.to_string());
        self.flush()
    }

    fn line(&mut self, raw: &str) -> DecodeResult<Option<Vec<MetricSample>>> {
        let terminated = raw.ends_with('\n');
        let text = raw.trim();
        if text.is_empty() {
            return Ok(None);
        }
        if !terminated {
            return Err(DecodeError::Truncated { line: self.line_no });
        }
        match text.strip_prefix('#') {
            Some(comment) => self.comment(comment),
            None => self.sample_line(text),
        }
    }

    fn comment(&mut self, comment: &str) -> DecodeResult<Option<Vec<MetricSample>>> {
        if !comment.starts_with([' ', '\t']) {
            return Ok(None);
        }
        let (keyword, rest) = split_token(comment.trim_start());
        if keyword != "HELP" && keyword != "TYPE" {
            return Ok(None);
        }
        let (name, rest) = split_token(rest.trim_start());
        if name.is_empty() {
            return Err(self.error(format!("{keyword} line without metric name")));
        }
        if !valid_metric_name(name) {
            return Err(self.error(format!("invalid metric name {name:?}")));
        }

        if keyword == "HELP" {
            let meta = self.families.entry(name.to_string()).or_default();
            if meta.has_help {
                return Err(self.error(format!("second HELP line for metric name {name:?}")));
            }
            meta.has_help = true;
        } else {
            let kind = rest.trim();
            let kind = MetricType::parse(kind)
                .ok_or_else(|| self.error(format!("unknown metric type {kind:?}")))?;
            let meta = self.families.entry(name.to_string()).or_default();
            if meta.kind.is_some() {
                return Err(self.error(format!("second TYPE line for metric name {name:?}")));
            }
            if meta.has_samples {
                return Err(self.error(format!(
                    "TYPE line for metric name {name:?} after its samples"
                )));
            }
            meta.kind = Some(kind);
        }
        Ok(self.switch_to(name))
    }

    fn sample_line(&mut self, line: &str) -> DecodeResult<Option<Vec<MetricSample>>> {
        let sample = self.parse_sample(line)?;
        let family = self.family_of(&sample.name);
        self.families.entry(family.clone()).or_default().has_samples = true;
        let flushed = self.switch_to(&family);
        self.pending.push(sample);
        Ok(flushed)
    }

    /// The family a sample name belongs to: a declared histogram or summary
    /// base name when the suffix matches, otherwise the name itself.
    fn family_of(&self, name: &str) -> String {
        for (family, meta) in &self.families {
            let Some(kind) = meta.kind else { continue };
            let folds = kind
                .member_suffixes()
                .iter()
                .any(|suffix| name.strip_suffix(suffix) == Some(family.as_str()));
            if folds {
                return family.clone();
            }
        }
        name.to_string()
    }

    fn parse_sample(&self, line: &str) -> DecodeResult<MetricSample> {
        let name_end = line
            .find(|c: char| !is_metric_name_char(c))
            .unwrap_or(line.len());
        let name = &line[..name_end];
        let mut rest = &line[name_end..];
        if !valid_metric_name(name) || !(rest.is_empty() || rest.starts_with([' ', '\t', '{'])) {
            let token = split_token(line).0;
            return Err(self.error(format!("invalid metric name in {token:?}")));
        }

        let mut labels = BTreeMap::new();
        let after_name = rest.trim_start_matches([' ', '\t']);
        if let Some(label_text) = after_name.strip_prefix('{') {
            rest = self.parse_labels(label_text, &mut labels)?;
        }

        let mut fields = rest.split_whitespace();
        let value_token = fields
            .next()
            .ok_or_else(|| self.error(format!("missing value for metric {name:?}")))?;
        let value = value_token
            .parse::<f64>()
            .map_err(|_| self.error(format!("expected float as value, got {value_token:?}")))?;
        let timestamp_ms = match fields.next() {
            Some(token) => token
                .parse::<i64>()
                .map_err(|_| self.error(format!("expected integer as timestamp, got {token:?}")))?,
            None => self.default_timestamp_ms,
        };
        if let Some(extra) = fields.next() {
            return Err(self.error(format!("unexpected {extra:?} after timestamp")));
        }

        Ok(MetricSample {
            name: name.to_string(),
            labels,
            value,
            timestamp_ms,
        })
    }

    /// Parse `name="value",...}` and return the text after the closing brace.
    fn parse_labels<'l>(
        &self,
        text: &'l str,
        labels: &mut BTreeMap<String, String>,
    ) -> DecodeResult<&'l str> {
        let mut rest = text;
        loop {
            rest = rest.trim_start();
            if let Some(after) = rest.strip_prefix('}') {
                return Ok(after);
            }
            if rest.is_empty() {
                return Err(self.error("unterminated label set"));
            }

            let name_end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            let label = &rest[..name_end];
            if !valid_label_name(label) {
                let token = split_token(rest).0;
                return Err(self.error(format!("invalid label name in {token:?}")));
            }
            rest = rest[name_end..].trim_start();
            rest = rest
                .strip_prefix('=')
                .ok_or_else(|| self.error(format!("expected '=' after label name {label:?}")))?
                .trim_start();
            rest = rest.strip_prefix('"').ok_or_else(|| {
                self.error(format!("expected quoted value for label {label:?}"))
            })?;

            let (value, after) = self.parse_quoted(rest)?;
            if labels.insert(label.to_string(), value).is_some() {
                return Err(self.error(format!("duplicate label name {label:?}")));
            }

            rest = after.trim_start();
            if let Some(after_comma) = rest.strip_prefix(',') {
                rest = after_comma;
            } else if !rest.starts_with('}') {
                if rest.is_empty() {
                    return Err(self.error("unterminated label set"));
                }
                let token = split_token(rest).0;
                return Err(self.error(format!("unexpected {token:?} in label set")));
            }
        }
    }

    /// Parse a quoted label value body (opening quote already consumed).
    fn parse_quoted<'l>(&self, text: &'l str) -> DecodeResult<(String, &'l str)> {
        let mut out = String::new();
        let mut chars = text.char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => return Ok((out, &text[i + 1..])),
                '\\' => match chars.next() {
                    Some((_, '\\')) => out.push('\\'),
                    Some((_, '"')) => out.push('"'),
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, other)) => {
                        return Err(self.error(format!("invalid escape sequence '\\{other}'")));
                    }
                    None => break,
                },
                c => out.push(c),
            }
        }
        Err(self.error("unterminated label value"))
    }
}

impl Iterator for Decoder<'_> {
    type Item = DecodeResult<Vec<MetricSample>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.lines.is_none() {
            self.done = true;
            return Some(Err(DecodeError::InvalidUtf8));
        }

        loop {
            let Some(raw) = self.lines.as_mut().and_then(|lines| lines.next()) else {
                self.done = true;
                return self.flush().map(Ok);
            };
            self.line_no += 1;
            match self.line(raw) {
                Ok(Some(vector)) => return Some(Ok(vector)),
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    self.pending.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}

impl std::iter::FusedIterator for Decoder<'_> {}

/// Decode a whole scrape body.
///
/// All-or-nothing: any malformed entry discards every sample of the body.
pub fn decode(body: &[u8], default_timestamp_ms: i64) -> DecodeResult<Vec<MetricSample>> {
    let mut samples = Vec::new();
    for vector in Decoder::new(body).with_default_timestamp(default_timestamp_ms) {
        samples.extend(vector?);
    }
    Ok(samples)
}

fn split_token(s: &str) -> (&str, &str) {
    match s.find([' ', '\t']) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

fn is_metric_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

fn valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(is_metric_name_char)
}

fn valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const CADVISOR: &str = r#"# HELP cadvisor_version_info A metric with a constant '1' value labeled by kernel version.
# TYPE cadvisor_version_info gauge
cadvisor_version_info{cadvisorRevision="",cadvisorVersion="",dockerVersion="",kernelVersion="5.15.0",osVersion="Ubuntu 22.04"} 1
# HELP container_cpu_usage_seconds_total Cumulative cpu time consumed in seconds.
# TYPE container_cpu_usage_seconds_total counter
container_cpu_usage_seconds_total{container="",cpu="total",id="/",image="",name="",namespace="",pod=""} 9384.12 1700000000123
container_cpu_usage_seconds_total{container="app",cpu="total",id="/kubepods/pod1/c1",image="nginx:1.25",name="c1",namespace="default",pod="web-0"} 12.5 1700000000456
container_cpu_usage_seconds_total{container="sidecar",cpu="total",id="/kubepods/pod1/c2",image="envoy",name="c2",namespace="default",pod="web-0"} 3.25 1700000000789
# HELP container_memory_usage_bytes Current memory usage in bytes, including all memory regardless of when it was accessed
# TYPE container_memory_usage_bytes gauge
container_memory_usage_bytes{container="app",namespace="default",pod="web-0"} 2.4576e+07 1700000000456
"#;

    fn vectors(body: &str) -> Vec<DecodeResult<Vec<MetricSample>>> {
        Decoder::new(body.as_bytes()).collect()
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(vectors("").is_empty());
        assert_eq!(decode(b"", 0).unwrap(), vec![]);
        assert_eq!(decode(b"\n\n  \n", 0).unwrap(), vec![]);
    }

    #[test]
    fn single_vector_with_three_samples() {
        let body = "# TYPE requests_total counter\n\
                    requests_total{code=\"200\"} 10\n\
                    requests_total{code=\"404\"} 2\n\
                    requests_total{code=\"500\"} 1\n";
        let out = vectors(body);
        assert_eq!(out.len(), 1);
        let samples = out[0].as_ref().unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[1].labels["code"], "404");
        assert_eq!(samples[1].value, 2.0);
    }

    #[test]
    fn cadvisor_body_groups_by_family() {
        let out: Vec<_> = Decoder::new(CADVISOR.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let sizes: Vec<usize> = out.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1, 3, 1]);

        let app = &out[1][1];
        assert_eq!(app.name, "container_cpu_usage_seconds_total");
        assert_eq!(app.labels["pod"], "web-0");
        assert_eq!(app.labels["container"], "app");
        assert_eq!(app.value, 12.5);
        assert_eq!(app.timestamp_ms, 1_700_000_000_456);

        assert_eq!(out[2][0].value, 24_576_000.0);
    }

    #[test]
    fn missing_timestamp_uses_default() {
        let samples = decode(b"up 1\nup{job=\"x\"} 0 42\n", 777).unwrap();
        assert_eq!(samples[0].timestamp_ms, 777);
        assert_eq!(samples[1].timestamp_ms, 42);
    }

    #[test]
    fn histogram_samples_fold_into_one_vector() {
        let body = "# TYPE latency_seconds histogram\n\
                    latency_seconds_bucket{le=\"0.1\"} 3\n\
                    latency_seconds_bucket{le=\"+Inf\"} 5\n\
                    latency_seconds_sum 0.9\n\
                    latency_seconds_count 5\n\
                    other_total 1\n";
        let out: Vec<_> = Decoder::new(body.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 4);
        assert_eq!(out[0][2].name, "latency_seconds_sum");
        assert_eq!(out[1][0].name, "other_total");
    }

    #[test]
    fn special_float_values() {
        let samples = decode(b"a NaN\nb +Inf\nc -Inf\nd 1e-3\n", 0).unwrap();
        assert!(samples[0].value.is_nan());
        assert_eq!(samples[1].value, f64::INFINITY);
        assert_eq!(samples[2].value, f64::NEG_INFINITY);
        assert_eq!(samples[3].value, 0.001);
    }

    #[test]
    fn label_escapes_and_trailing_comma() {
        let body = "m{path=\"C:\\\\tmp\",msg=\"say \\\"hi\\\"\\nbye\",} 1\n";
        let samples = decode(body.as_bytes(), 0).unwrap();
        assert_eq!(samples[0].labels["path"], "C:\\tmp");
        assert_eq!(samples[0].labels["msg"], "say \"hi\"\nbye");
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let body = "# just a comment\n#no space either\n\n   \nm 1\n";
        assert_eq!(decode(body.as_bytes(), 0).unwrap().len(), 1);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let err = decode(b"m{a=\"b\"} 1\nm{a=\"c\"} 2", 0).unwrap_err();
        assert_eq!(err, DecodeError::Truncated { line: 2 });
    }

    #[test]
    fn malformed_entries_are_errors() {
        let cases = [
            "m abc\n",
            "m\n",
            "m 1 notatime\n",
            "m 1 2 3\n",
            "9m 1\n",
            "m-x 1\n",
            "m{a=\"b\" 1\n",
            "m{a=b} 1\n",
            "m{a=\"b\",a=\"c\"} 1\n",
            "m{1a=\"b\"} 1\n",
            "m{a=\"\\x\"} 1\n",
            "m{a=\"unterminated} 1\n",
            "# TYPE m bogus\n",
            "# TYPE m counter\n# TYPE m gauge\n",
            "# HELP m one\n# HELP m two\n",
            "m 1\n# TYPE m counter\n",
            "# TYPE\n",
        ];
        for body in cases {
            let result = decode(body.as_bytes(), 0);
            assert!(
                matches!(result, Err(DecodeError::Syntax { .. })),
                "expected syntax error for {body:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn error_ends_iteration_after_earlier_vectors() {
        let body = "good 1\nbad{ 2\nlater 3\n";
        let mut decoder = Decoder::new(body.as_bytes());

        // The first family is only complete once the next line is read,
        // and that line is malformed.
        let first = decoder.next().unwrap();
        assert!(matches!(first, Err(DecodeError::Syntax { line: 2, .. })));
        assert!(decoder.next().is_none());
        assert!(decoder.next().is_none());

        let body = "good 1\nnext 2\nbad{ 3\n";
        let out = vectors(body);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap()[0].name, "good");
        assert!(out[1].is_err());

        // The all-or-nothing form drops the earlier vector too.
        assert!(decode(body.as_bytes(), 0).is_err());
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let out: Vec<_> = Decoder::new(&[b'm', b' ', 0xff, b'\n']).collect();
        assert_eq!(out, vec![Err(DecodeError::InvalidUtf8)]);
    }
}
