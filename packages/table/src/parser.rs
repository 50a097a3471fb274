//! The row state machine.
//!
//! [`TableParser`] consumes rows one at a time and yields
//! [`AccidentRecord`]s as soon as they are complete. It never looks ahead;
//! the only buffering is the backlog of records seen before the first
//! directorate marker, which are stamped and released once a directorate
//! is accepted.

use std::collections::VecDeque;
use std::sync::LazyLock;

use accident_map_accident_models::AccidentRecord;
use regex::Regex;

use crate::TableError;
use crate::layout::{CompiledLayout, leading_number};
use crate::rows::{RawRow, cell};

/// Two or more whitespace characters.
static MULTI_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));

/// Trims and collapses interior whitespace runs to one space.
#[must_use]
pub fn clean_name(name: &str) -> String {
    MULTI_SPACE_RE.replace_all(name.trim(), " ").into_owned()
}

/// The street currently being assembled.
#[derive(Debug, Default)]
enum Pending {
    #[default]
    Empty,
    /// Fragments seen so far, still waiting for a count.
    Open(String),
    /// Already counted, but may still receive one trailing fragment
    /// (late-suffix layouts only).
    Counted {
        name: String,
        count: u32,
        directorate: Option<u32>,
    },
}

impl Pending {
    const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    fn name(&self) -> &str {
        match self {
            Self::Empty => "",
            Self::Open(name) | Self::Counted { name, .. } => name,
        }
    }

    /// Whether the next fragment should be matched with the continuation
    /// pattern.
    fn wants_loose_match(&self, threshold: usize) -> bool {
        match self {
            Self::Empty => false,
            Self::Open(name) => name.chars().count() > threshold,
            Self::Counted { .. } => true,
        }
    }
}

/// Lazily parses report rows into accident records.
///
/// Yields `Err` at most once; the parser is exhausted afterwards.
pub struct TableParser<I> {
    rows: I,
    layout: CompiledLayout,
    year: i32,
    line: usize,
    directorate: Option<u32>,
    pending: Pending,
    backlog: Vec<AccidentRecord>,
    ready: VecDeque<AccidentRecord>,
    finished: bool,
}

impl<I> TableParser<I>
where
    I: Iterator<Item = Result<RawRow, TableError>>,
{
    pub fn new(rows: I, layout: CompiledLayout, year: i32) -> Self {
        Self {
            rows,
            layout,
            year,
            line: 0,
            directorate: None,
            pending: Pending::Empty,
            backlog: Vec::new(),
            ready: VecDeque::new(),
            finished: false,
        }
    }

    fn process_row(&mut self, row: &[String]) -> Result<(), TableError> {
        let marker = cell(row, self.layout.layout().marker_column);
        if !marker.is_empty() {
            let Some(value) = self.number(marker)? else {
                log::trace!("Row {}: skipping non-numeric marker {marker:?}", self.line);
                return Ok(());
            };
            self.observe_marker(value);
        }

        let name_cell = cell(row, self.layout.layout().name_column).trim_start();
        if !name_cell.is_empty() {
            let loose = self
                .pending
                .wants_loose_match(self.layout.layout().long_name_threshold);

            if self.layout.is_fragment(name_cell, loose) {
                match std::mem::take(&mut self.pending) {
                    Pending::Empty => self.pending = Pending::Open(name_cell.to_owned()),
                    Pending::Open(name) => {
                        self.pending = Pending::Open(format!("{name} {name_cell}"));
                    }
                    Pending::Counted {
                        name,
                        count,
                        directorate,
                    } => {
                        self.emit(&format!("{name} {name_cell}"), count, directorate);
                        return Ok(());
                    }
                }
            } else if self.pending.is_empty() {
                return Ok(());
            } else if self.layout.is_section_end(name_cell) {
                match std::mem::take(&mut self.pending) {
                    Pending::Empty => {}
                    Pending::Open(name) => {
                        let count = self.layout.layout().default_count;
                        self.emit(&name, count, self.directorate);
                    }
                    Pending::Counted {
                        name,
                        count,
                        directorate,
                    } => self.emit(&name, count, directorate),
                }
                return Ok(());
            } else {
                return Err(TableError::StructuralParse {
                    line: self.line,
                    cell: name_cell.to_owned(),
                    pending: self.pending.name().to_owned(),
                });
            }
        }

        let Some(count) = self.number(cell(row, self.layout.layout().count_column))? else {
            return Ok(());
        };

        match std::mem::take(&mut self.pending) {
            Pending::Open(name) if name_cell.is_empty() && self.layout.layout().late_suffix => {
                self.pending = Pending::Counted {
                    name,
                    count,
                    directorate: self.directorate,
                };
            }
            Pending::Open(name) => self.emit(&name, count, self.directorate),
            other => self.pending = other,
        }

        Ok(())
    }

    fn number(&self, cell: &str) -> Result<Option<u32>, TableError> {
        leading_number(cell).map_err(|source| TableError::InvalidNumber {
            line: self.line,
            cell: cell.to_owned(),
            source,
        })
    }

    /// Handles a numeric marker cell. Accepting a new directorate releases
    /// the backlog stamped with it.
    fn observe_marker(&mut self, value: u32) {
        if !self.layout.accepts_directorate(value, self.directorate) {
            log::trace!(
                "Row {}: ignoring marker {value} (current directorate {:?})",
                self.line,
                self.directorate
            );
            return;
        }

        log::debug!("Row {}: directorate {value}", self.line);
        self.directorate = Some(value);

        for mut record in self.backlog.drain(..) {
            record.directorate = Some(value);
            self.ready.push_back(record);
        }

        self.pending = match std::mem::take(&mut self.pending) {
            Pending::Counted {
                name,
                count,
                directorate: None,
            } => {
                self.emit(&name, count, Some(value));
                Pending::Empty
            }
            other => other,
        };
    }

    fn emit(&mut self, name: &str, count: u32, directorate: Option<u32>) {
        let record = AccidentRecord {
            year: self.year,
            directorate,
            street_raw: clean_name(name),
            count,
        };

        if directorate.is_some() {
            self.ready.push_back(record);
        } else {
            log::trace!("Row {}: holding {:?} until a directorate", self.line, record.street_raw);
            self.backlog.push(record);
        }
    }

    fn finish(&mut self) -> Result<(), TableError> {
        match std::mem::take(&mut self.pending) {
            Pending::Empty => {}
            Pending::Open(name) => {
                return Err(TableError::UnterminatedName {
                    name: clean_name(&name),
                });
            }
            Pending::Counted {
                name,
                count,
                directorate,
            } => self.emit(&name, count, directorate),
        }

        if !self.backlog.is_empty() {
            log::warn!(
                "{} rows of the {} table never saw a directorate",
                self.backlog.len(),
                self.year
            );
            self.ready.extend(self.backlog.drain(..));
        }

        Ok(())
    }
}

impl<I> Iterator for TableParser<I>
where
    I: Iterator<Item = Result<RawRow, TableError>>,
{
    type Item = Result<AccidentRecord, TableError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.ready.pop_front() {
                return Some(Ok(record));
            }
            if self.finished {
                return None;
            }

            let step = match self.rows.next() {
                Some(Ok(row)) => {
                    self.line += 1;
                    self.process_row(&row)
                }
                Some(Err(e)) => Err(e),
                None => {
                    self.finished = true;
                    self.finish()
                }
            };

            if let Err(e) = step {
                self.finished = true;
                self.ready.clear();
                return Some(Err(e));
            }
        }
    }
}

/// Parses an in-memory table.
///
/// # Errors
///
/// Returns the first [`TableError`] the parser hits.
pub fn parse_rows<R>(
    rows: R,
    layout: &CompiledLayout,
    year: i32,
) -> Result<Vec<AccidentRecord>, TableError>
where
    R: IntoIterator<Item = RawRow>,
{
    TableParser::new(rows.into_iter().map(Ok), layout.clone(), year).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TableLayout;

    fn rows(cells: &[&[&str]]) -> Vec<RawRow> {
        cells
            .iter()
            .map(|row| row.iter().map(|c| (*c).to_owned()).collect())
            .collect()
    }

    fn parse(cells: &[&[&str]]) -> Result<Vec<AccidentRecord>, TableError> {
        parse_rows(rows(cells), &TableLayout::default().compile().unwrap(), 2012)
    }

    fn late_suffix_layout() -> CompiledLayout {
        TableLayout {
            late_suffix: true,
            ..TableLayout::default()
        }
        .compile()
        .unwrap()
    }

    fn triples(records: &[AccidentRecord]) -> Vec<(&str, u32, Option<u32>)> {
        records
            .iter()
            .map(|r| (r.street_raw.as_str(), r.count, r.directorate))
            .collect()
    }

    #[test]
    fn marker_then_street_and_count() {
        let records = parse(&[&["12", "", ""], &["", "", "HAUPTSTR", "5"]]).unwrap();
        assert_eq!(triples(&records), vec![("HAUPTSTR", 5, Some(12))]);
        assert_eq!(records[0].year, 2012);
    }

    #[test]
    fn wrapped_name_is_joined_with_single_spaces() {
        let records = parse(&[
            &["4", "", ""],
            &["", "", "HAUPT   ", ""],
            &["", "", "STRASSE", ""],
            &["", "", "", "7"],
        ])
        .unwrap();
        assert_eq!(triples(&records), vec![("HAUPT STRASSE", 7, Some(4))]);
    }

    #[test]
    fn backlog_is_stamped_with_the_next_directorate() {
        let records = parse(&[
            &["", "", "ALEXANDERPLATZ", "3"],
            &["", "", "TORSTR", "2"],
            &["5", "", "", ""],
            &["", "", "KARL-MARX-ALLEE", "1"],
        ])
        .unwrap();
        assert_eq!(
            triples(&records),
            vec![
                ("ALEXANDERPLATZ", 3, Some(5)),
                ("TORSTR", 2, Some(5)),
                ("KARL-MARX-ALLEE", 1, Some(5)),
            ]
        );
    }

    #[test]
    fn directorates_never_decrease() {
        let records = parse(&[
            &["3", "", ""],
            &["", "", "TORSTR", "2"],
            &["2", "", "BADSTR", "4"],
            &["70", "", "", ""],
            &["6", "", "HEERSTR", "1"],
        ])
        .unwrap();
        assert_eq!(
            triples(&records),
            vec![
                ("TORSTR", 2, Some(3)),
                ("BADSTR", 4, Some(3)),
                ("HEERSTR", 1, Some(6)),
            ]
        );
    }

    #[test]
    fn non_numeric_marker_rows_are_skipped() {
        let records = parse(&[
            &["Direktion", "", "HEADERSTR", "9"],
            &["", "", "Straße", "Anzahl"],
            &["1", "", "TORSTR", "2"],
        ])
        .unwrap();
        assert_eq!(triples(&records), vec![("TORSTR", 2, Some(1))]);
    }

    #[test]
    fn section_end_closes_with_default_count() {
        let records = parse(&[
            &["3", "", ""],
            &["", "", "FRIEDRICHSTR", ""],
            &["", "", "in der Direktion 3 insgesamt", "120"],
        ])
        .unwrap();
        assert_eq!(triples(&records), vec![("FRIEDRICHSTR", 1, Some(3))]);
    }

    #[test]
    fn unrecognized_cell_inside_a_name_is_fatal() {
        let err = parse(&[
            &["1", "", ""],
            &["", "", "HAUPT", ""],
            &["", "", "unbekannt", ""],
        ])
        .unwrap_err();
        match err {
            TableError::StructuralParse {
                line,
                cell,
                pending,
            } => {
                assert_eq!(line, 3);
                assert_eq!(cell, "unbekannt");
                assert_eq!(pending, "HAUPT");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn records_before_the_error_are_still_yielded() {
        let layout = TableLayout::default().compile().unwrap();
        let mut parser = TableParser::new(
            rows(&[
                &["1", "", ""],
                &["", "", "TORSTR", "2"],
                &["", "", "HAUPT", ""],
                &["", "", "unbekannt", ""],
                &["", "", "BADSTR", "1"],
            ])
            .into_iter()
            .map(Ok),
            layout,
            2012,
        );
        assert_eq!(parser.next().unwrap().unwrap().street_raw, "TORSTR");
        assert!(parser.next().unwrap().is_err());
        assert!(parser.next().is_none());
    }

    #[test]
    fn long_names_accept_short_continuations() {
        let long = "A".repeat(40);
        let records = parse(&[&["1", "", ""], &["", "", &long, ""], &["", "", "II", "3"]]).unwrap();
        let expected = format!("{long} II");
        assert_eq!(triples(&records), vec![(expected.as_str(), 3, Some(1))]);
    }

    #[test]
    fn short_names_reject_short_continuations() {
        let err = parse(&[&["1", "", ""], &["", "", "HAUPT", ""], &["", "", "II", "3"]]);
        assert!(matches!(err, Err(TableError::StructuralParse { line: 3, .. })));
    }

    #[test]
    fn unterminated_name_at_end_is_an_error() {
        let err = parse(&[&["1", "", ""], &["", "", "HAUPT", ""]]).unwrap_err();
        assert!(matches!(err, TableError::UnterminatedName { name } if name == "HAUPT"));
    }

    #[test]
    fn oversized_count_is_an_error() {
        let err = parse(&[
            &["1", "", ""],
            &["", "", "HAUPTSTR", "4294967296"],
            &["", "", "TORSTR", "2"],
        ])
        .unwrap_err();
        match err {
            TableError::InvalidNumber { line, cell, .. } => {
                assert_eq!(line, 2);
                assert_eq!(cell, "4294967296");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn oversized_marker_is_an_error() {
        let err = parse(&[&["99999999999", "", ""], &["", "", "TORSTR", "2"]]);
        assert!(matches!(err, Err(TableError::InvalidNumber { line: 1, .. })));
    }

    #[test]
    fn section_end_record_before_any_directorate_waits_in_the_backlog() {
        let records = parse(&[
            &["", "", "TORSTR", ""],
            &["", "", "in der Direktion", ""],
            &["3", "", "", ""],
        ])
        .unwrap();
        assert_eq!(triples(&records), vec![("TORSTR", 1, Some(3))]);
    }

    #[test]
    fn orphaned_backlog_is_released_without_directorate() {
        let records = parse(&[&["", "", "TORSTR", "2"]]).unwrap();
        assert_eq!(triples(&records), vec![("TORSTR", 2, None)]);
    }

    #[test]
    fn late_suffix_layout_waits_for_one_more_fragment() {
        let layout = TableLayout {
            late_suffix: true,
            ..TableLayout::default()
        }
        .compile()
        .unwrap();
        let records = parse_rows(
            rows(&[
                &["2", "", ""],
                &["", "", "FRANKFURTER", ""],
                &["", "", "", "9"],
                &["", "", "ALLEE", ""],
                &["", "", "TORSTR", ""],
                &["", "", "", "4"],
            ]),
            &layout,
            2004,
        )
        .unwrap();
        assert_eq!(
            triples(&records),
            vec![("FRANKFURTER ALLEE", 9, Some(2)), ("TORSTR", 4, Some(2))]
        );
    }

    #[test]
    fn late_suffix_entry_is_stamped_by_a_new_directorate() {
        let layout = TableLayout {
            late_suffix: true,
            ..TableLayout::default()
        }
        .compile()
        .unwrap();
        let records = parse_rows(
            rows(&[&["", "", "TORSTR", ""], &["", "", "", "4"], &["8", "", "", ""]]),
            &layout,
            2004,
        )
        .unwrap();
        assert_eq!(triples(&records), vec![("TORSTR", 4, Some(8))]);
    }

    #[test]
    fn late_suffix_entry_held_at_end_of_input_is_emitted() {
        let layout = late_suffix_layout();
        let records = parse_rows(
            rows(&[&["2", "", ""], &["", "", "TORSTR", ""], &["", "", "", "4"]]),
            &layout,
            2004,
        )
        .unwrap();
        assert_eq!(triples(&records), vec![("TORSTR", 4, Some(2))]);
    }

    #[test]
    fn section_end_keeps_the_count_of_a_late_suffix_entry() {
        let layout = late_suffix_layout();
        let records = parse_rows(
            rows(&[
                &["2", "", ""],
                &["", "", "TORSTR", ""],
                &["", "", "", "4"],
                &["", "", "in der Direktion 2", ""],
            ]),
            &layout,
            2004,
        )
        .unwrap();
        assert_eq!(triples(&records), vec![("TORSTR", 4, Some(2))]);
    }

    #[test]
    fn parses_straight_from_csv() {
        let input = "12,,\n,,HAUPTSTR,5\n";
        let layout = TableLayout::default().compile().unwrap();
        let records: Vec<AccidentRecord> =
            TableParser::new(crate::rows::read_rows(input.as_bytes()), layout, 2015)
                .collect::<Result<_, _>>()
                .unwrap();
        assert_eq!(triples(&records), vec![("HAUPTSTR", 5, Some(12))]);
    }

    #[test]
    fn clean_name_collapses_whitespace() {
        assert_eq!(clean_name("  HAUPT   STRASSE \t"), "HAUPT STRASSE");
        assert_eq!(clean_name("TORSTR"), "TORSTR");
    }
}
