//! Spreadsheet round-trip for quizzes: the downloadable template and the importer that reads it.
//!
//! Layout of the first sheet:
//! - rows 1..8 hold `key | value` metadata pairs in columns A and B;
//! - a header row (`question_text`, normally row 9) precedes the questions;
//! - each question row is `text | type | marks | choice | flag | choice | flag ...`.

use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Range, Reader, Xlsx, XlsxError};
use rust_xlsxwriter::{Format, Workbook};
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::core::time::{from_excel_serial, parse_datetime};
use crate::services::quiz_authoring::{AuthoringError, ChoiceDraft, QuestionDraft};

pub(crate) const TEMPLATE_FILENAME: &str = "quiz_template.xlsx";
pub(crate) const TEMPLATE_SHEET: &str = "QuizTemplate";
pub(crate) const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const METADATA_ROWS: u32 = 8;
const HEADER_SEARCH_ROWS: u32 = 30;
const DEFAULT_HEADER_ROW: u32 = 8;
const FIRST_CHOICE_COLUMN: u32 = 3;
const TEMPLATE_CHOICES: u16 = 6;
const DEFAULT_DURATION_MINUTES: i64 = 30;

#[derive(Debug, Error)]
pub(crate) enum ImportError {
    #[error("Invalid Excel file: {0}")]
    InvalidFile(String),
    #[error("Metadata must include class_name, subject_name and quiz_title")]
    MissingMetadata,
    #[error("Invalid start_time or end_time in metadata. Use 'YYYY-MM-DD HH:MM' or Excel datetime.")]
    InvalidWindow,
    #[error("Invalid duration_minutes in metadata")]
    InvalidDuration,
    #[error(transparent)]
    Authoring(#[from] AuthoringError),
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    fn from_data(data: Option<&Data>) -> Self {
        match data {
            None | Some(Data::Empty) | Some(Data::Error(_)) => Self::Empty,
            Some(Data::String(value)) if value.trim().is_empty() => Self::Empty,
            Some(Data::String(value)) => Self::Text(value.trim().to_string()),
            Some(Data::DateTimeIso(value)) | Some(Data::DurationIso(value)) => {
                Self::Text(value.trim().to_string())
            }
            Some(Data::Float(value)) => Self::Number(*value),
            Some(Data::Int(value)) => Self::Number(*value as f64),
            Some(Data::DateTime(value)) => Self::Number(value.as_f64()),
            Some(Data::Bool(value)) => Self::Bool(*value),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    fn text(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Text(value) => Some(value.clone()),
            Self::Number(value) if value.fract() == 0.0 => Some(format!("{}", *value as i64)),
            Self::Number(value) => Some(value.to_string()),
            Self::Bool(value) => Some(if *value { "True" } else { "False" }.to_string()),
        }
    }

    fn number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(value) => value.parse().ok(),
            _ => None,
        }
    }

    fn datetime(&self) -> Option<PrimitiveDateTime> {
        match self {
            Self::Number(serial) => from_excel_serial(*serial),
            Self::Text(value) => parse_datetime(value),
            _ => None,
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Number(value) => *value == 1.0,
            Self::Text(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
            Self::Empty => false,
        }
    }

    fn is_correct_flag(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Number(value) => *value == 1.0,
            Self::Text(value) => matches!(value.as_str(), "1" | "true" | "TRUE" | "True"),
            Self::Empty => false,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ImportedQuiz {
    pub(crate) title: String,
    pub(crate) class_name: String,
    pub(crate) subject_name: String,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) duration_minutes: i64,
    pub(crate) is_published: bool,
    pub(crate) questions: Vec<QuestionDraft>,
}

pub(crate) fn parse_workbook(bytes: &[u8]) -> Result<ImportedQuiz, ImportError> {
    let mut workbook: Xlsx<Cursor<&[u8]>> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|err: XlsxError| ImportError::InvalidFile(err.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ImportError::InvalidFile("workbook has no sheets".to_string()))?
        .map_err(|err: XlsxError| ImportError::InvalidFile(err.to_string()))?;

    parse_sheet(|row, col| cell_at(&range, row, col))
}

fn cell_at(range: &Range<Data>, row: u32, col: u32) -> Cell {
    Cell::from_data(range.get_value((row, col)))
}

/// Reads a quiz from a sheet addressed by zero-based `(row, column)`.
fn parse_sheet(cell: impl Fn(u32, u32) -> Cell) -> Result<ImportedQuiz, ImportError> {
    let mut metadata: Vec<(String, Cell)> = Vec::new();
    for row in 0..METADATA_ROWS {
        if let Some(key) = cell(row, 0).text() {
            metadata.push((key.trim().to_lowercase(), cell(row, 1)));
        }
    }
    let meta = |keys: &[&str]| -> Cell {
        keys.iter()
            .find_map(|key| {
                metadata
                    .iter()
                    .find(|(name, value)| name.as_str() == *key && !value.is_empty())
                    .map(|(_, value)| value.clone())
            })
            .unwrap_or(Cell::Empty)
    };

    let title = meta(&["quiz_title", "title"]).text();
    let class_name = meta(&["class_name"]).text();
    let subject_name = meta(&["subject_name"]).text();
    let (Some(title), Some(class_name), Some(subject_name)) = (title, class_name, subject_name)
    else {
        return Err(ImportError::MissingMetadata);
    };

    let start_time = meta(&["start_time"]).datetime().ok_or(ImportError::InvalidWindow)?;
    let end_time = meta(&["end_time"]).datetime().ok_or(ImportError::InvalidWindow)?;

    let duration_minutes = match meta(&["duration_minutes", "duration"]) {
        Cell::Empty => DEFAULT_DURATION_MINUTES,
        value => value
            .number()
            .filter(|minutes| minutes.fract() == 0.0)
            .map(|minutes| minutes as i64)
            .ok_or(ImportError::InvalidDuration)?,
    };
    let is_published = meta(&["is_published"]).is_truthy();

    let header_row = (0..HEADER_SEARCH_ROWS)
        .find(|row| {
            cell(*row, 0).text().is_some_and(|value| {
                matches!(value.to_lowercase().as_str(), "question_text" | "question" | "q_text")
            })
        })
        .unwrap_or(DEFAULT_HEADER_ROW);

    let mut questions = Vec::new();
    let mut row = header_row + 1;
    while let Some(text) = cell(row, 0).text() {
        let question_type =
            cell(row, 1).text().map(|value| value.to_lowercase()).unwrap_or_else(|| "objective".into());
        let marks = match cell(row, 2) {
            Cell::Empty => 1.0,
            value => value
                .number()
                .ok_or(AuthoringError::InvalidQuestion(questions.len()))?,
        };

        let mut choices = Vec::new();
        let mut col = FIRST_CHOICE_COLUMN;
        while let Some(choice_text) = cell(row, col).text() {
            choices.push(ChoiceDraft {
                text: Some(choice_text),
                is_correct: cell(row, col + 1).is_correct_flag(),
            });
            col += 2;
        }

        questions.push(QuestionDraft {
            text: Some(text),
            question_type: Some(question_type),
            marks: Some(marks),
            choices,
        });
        row += 1;
    }

    Ok(ImportedQuiz {
        title,
        class_name,
        subject_name,
        start_time,
        end_time,
        duration_minutes,
        is_published,
        questions,
    })
}

/// Builds the blank template teachers fill in and upload.
pub(crate) fn build_template() -> Result<Vec<u8>, rust_xlsxwriter::XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(TEMPLATE_SHEET)?;
    worksheet.set_column_width(0, 28.0)?;
    worksheet.set_column_width(1, 20.0)?;

    let bold = Format::new().set_bold();

    let metadata = [
        ("quiz_title", "My Quiz Title"),
        ("class_name", "JSS1"),
        ("subject_name", "Mathematics"),
        ("start_time", "2025-09-13 14:00"),
        ("end_time", "2025-09-13 15:00"),
    ];
    for (row, (key, value)) in metadata.iter().enumerate() {
        worksheet.write_string_with_format(row as u32, 0, *key, &bold)?;
        worksheet.write_string(row as u32, 1, *value)?;
    }
    worksheet.write_string_with_format(5, 0, "duration_minutes", &bold)?;
    worksheet.write_number(5, 1, 60.0)?;
    worksheet.write_string_with_format(6, 0, "is_published", &bold)?;
    worksheet.write_string(6, 1, "True")?;

    let header_row = DEFAULT_HEADER_ROW;
    let mut headers = vec!["question_text".to_string(), "question_type".into(), "marks".into()];
    for index in 1..=TEMPLATE_CHOICES {
        headers.push(format!("choice_{index}"));
        headers.push(format!("choice_{index}_correct"));
    }
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(header_row, col as u16, header, &bold)?;
    }

    let example = header_row + 1;
    worksheet.write_string(example, 0, "What is 2+2?")?;
    worksheet.write_string(example, 1, "objective")?;
    worksheet.write_number(example, 2, 1.0)?;
    worksheet.write_string(example, 3, "3")?;
    worksheet.write_string(example, 4, "0")?;
    worksheet.write_string(example, 5, "4")?;
    worksheet.write_string(example, 6, "1")?;

    let mut cursor = Cursor::new(Vec::new());
    workbook.save_to_writer(&mut cursor)?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use time::macros::datetime;

    fn grid(cells: &[((u32, u32), Cell)]) -> impl Fn(u32, u32) -> Cell {
        let map: HashMap<(u32, u32), Cell> = cells.iter().cloned().collect();
        move |row, col| map.get(&(row, col)).cloned().unwrap_or(Cell::Empty)
    }

    fn text(value: &str) -> Cell {
        Cell::Text(value.to_string())
    }

    fn base_metadata() -> Vec<((u32, u32), Cell)> {
        vec![
            ((0, 0), text("Title")),
            ((0, 1), text("Fractions")),
            ((1, 0), text("class_name")),
            ((1, 1), text("JSS2")),
            ((2, 0), text("subject_name")),
            ((2, 1), text("Mathematics")),
            ((3, 0), text("start_time")),
            ((3, 1), Cell::Number(45658.375)),
            ((4, 0), text("end_time")),
            ((4, 1), text("2025-01-01 10:00")),
        ]
    }

    #[test]
    fn template_round_trips_through_the_importer() {
        let bytes = build_template().expect("template");
        let quiz = parse_workbook(&bytes).expect("parse template");

        assert_eq!(quiz.title, "My Quiz Title");
        assert_eq!(quiz.class_name, "JSS1");
        assert_eq!(quiz.subject_name, "Mathematics");
        assert_eq!(quiz.start_time, datetime!(2025-09-13 14:00:00));
        assert_eq!(quiz.end_time, datetime!(2025-09-13 15:00:00));
        assert_eq!(quiz.duration_minutes, 60);
        assert!(quiz.is_published);
        assert_eq!(quiz.questions.len(), 1);

        let question = &quiz.questions[0];
        assert_eq!(question.text.as_deref(), Some("What is 2+2?"));
        assert_eq!(question.choices.len(), 2);
        assert!(!question.choices[0].is_correct);
        assert!(question.choices[1].is_correct);
        assert_eq!(question.choices[1].text.as_deref(), Some("4"));
    }

    #[test]
    fn serial_dates_and_defaults_apply() {
        let mut cells = base_metadata();
        cells.push(((9, 0), text("question")));
        cells.push(((10, 0), text("Explain halves")));
        cells.push(((10, 1), text("Subjective")));

        let quiz = parse_sheet(grid(&cells)).expect("parse");
        assert_eq!(quiz.start_time, datetime!(2025-01-01 09:00:00));
        assert_eq!(quiz.duration_minutes, 30);
        assert!(!quiz.is_published);
        assert_eq!(quiz.questions.len(), 1);
        assert_eq!(quiz.questions[0].question_type.as_deref(), Some("subjective"));
        assert_eq!(quiz.questions[0].marks, Some(1.0));
    }

    #[test]
    fn header_defaults_to_row_nine_and_stops_at_blank_row() {
        let mut cells = base_metadata();
        cells.push(((9, 0), text("Q1")));
        cells.push(((9, 3), text("yes")));
        cells.push(((9, 4), Cell::Bool(true)));
        cells.push(((11, 0), text("never read")));

        let quiz = parse_sheet(grid(&cells)).expect("parse");
        assert_eq!(quiz.questions.len(), 1);
        assert!(quiz.questions[0].choices[0].is_correct);
    }

    #[test]
    fn missing_metadata_is_rejected() {
        let cells = vec![((0, 0), text("quiz_title")), ((0, 1), text("Only title"))];
        assert!(matches!(parse_sheet(grid(&cells)), Err(ImportError::MissingMetadata)));
    }

    #[test]
    fn bad_window_is_rejected() {
        let mut cells = base_metadata();
        cells[9] = ((4, 1), text("soon"));
        let err = parse_sheet(grid(&cells)).expect_err("invalid window");
        assert!(matches!(err, ImportError::InvalidWindow));
    }

    #[test]
    fn non_xlsx_bytes_are_invalid_files() {
        let err = parse_workbook(b"not a spreadsheet").expect_err("invalid");
        assert!(err.to_string().starts_with("Invalid Excel file: "));
    }

    #[test]
    fn unreadable_marks_reject_the_question() {
        let mut cells = base_metadata();
        cells.push(((9, 0), text("question_text")));
        cells.push(((10, 0), text("Name a prime")));
        cells.push(((10, 1), text("subjective")));
        cells.push(((10, 2), text("2")));
        cells.push(((11, 0), text("Explain halves")));
        cells.push(((11, 1), text("subjective")));
        cells.push(((11, 2), text("two")));

        let err = parse_sheet(grid(&cells)).expect_err("bad marks");
        assert!(matches!(err, ImportError::Authoring(AuthoringError::InvalidQuestion(1))));
    }

    #[test]
    fn flags_and_truthiness() {
        assert!(text("TRUE").is_correct_flag());
        assert!(Cell::Number(1.0).is_correct_flag());
        assert!(!text("yes").is_correct_flag());
        assert!(text("Yes").is_truthy());
        assert!(!Cell::Number(0.0).is_truthy());
    }
}
