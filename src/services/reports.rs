use std::io::Cursor;

use printpdf::{
    BuiltinFont, Line, LinePoint, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, Point, Pt,
    TextItem,
};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use thiserror::Error;

use crate::core::time::format_minutes;
use crate::repositories::stats::{AttemptReportRow, LeaderboardRow};

pub(crate) const PDF_CONTENT_TYPE: &str = "application/pdf";

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const TOP_MM: f32 = 280.0;
const BOTTOM_MARGIN_MM: f32 = 20.0;
const LEFT_MM: f32 = 15.0;

const ATTEMPT_HEADERS: [&str; 6] =
    ["Student", "Username", "Quiz", "Score", "Started At", "Completed At"];

#[derive(Debug, Error)]
pub(crate) enum ReportError {
    #[error("failed to build spreadsheet: {0}")]
    Spreadsheet(#[from] XlsxError),
}

/// Renders a score without a trailing `.0` for whole numbers.
pub(crate) fn format_score(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        let formatted = format!("{value:.2}");
        formatted.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

pub(crate) fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}...")
}

/// Multi-page A4 text document with a moving cursor.
struct PdfReport {
    title: String,
    pages: Vec<PdfPage>,
    ops: Vec<Op>,
    y: f32,
}

impl PdfReport {
    fn new(title: &str) -> Self {
        Self { title: title.to_string(), pages: Vec::new(), ops: Vec::new(), y: TOP_MM }
    }

    fn text(&mut self, x: f32, text: String, font: BuiltinFont, size: f32, advance: f32) {
        self.ensure_room(advance);
        Self::push_text(&mut self.ops, Point::new(Mm(x), Mm(self.y)), font, size, text);
        self.y -= advance;
    }

    /// Writes several strings on one baseline at the given x offsets.
    fn row(&mut self, cells: &[(f32, String)], font: BuiltinFont, size: f32, advance: f32) {
        self.ensure_room(advance);
        for (x, text) in cells {
            Self::push_text(&mut self.ops, Point::new(Mm(*x), Mm(self.y)), font, size, text.clone());
        }
        self.y -= advance;
    }

    fn rule(&mut self) {
        self.ensure_room(3.0);
        let y = self.y + 2.5;
        self.ops.push(Op::DrawLine {
            line: Line {
                points: vec![
                    LinePoint { p: Point::new(Mm(LEFT_MM), Mm(y)), bezier: false },
                    LinePoint { p: Point::new(Mm(PAGE_WIDTH_MM - LEFT_MM), Mm(y)), bezier: false },
                ],
                is_closed: false,
            },
        });
        self.y -= 3.0;
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn ensure_room(&mut self, needed: f32) {
        if self.y - needed < BOTTOM_MARGIN_MM {
            self.break_page();
        }
    }

    fn break_page(&mut self) {
        let ops = std::mem::take(&mut self.ops);
        self.pages.push(PdfPage::new(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), ops));
        self.y = TOP_MM;
    }

    #[cfg(test)]
    fn page_count(&self) -> usize {
        self.pages.len() + usize::from(!self.ops.is_empty())
    }

    fn finish(mut self) -> Vec<u8> {
        if !self.ops.is_empty() || self.pages.is_empty() {
            self.break_page();
        }
        let mut warnings = Vec::new();
        PdfDocument::new(&self.title).with_pages(self.pages).save(&PdfSaveOptions::default(), &mut warnings)
    }

    fn push_text(ops: &mut Vec<Op>, pos: Point, font: BuiltinFont, size: f32, text: String) {
        ops.extend([
            Op::StartTextSection,
            Op::SetTextCursor { pos },
            Op::SetFontSizeBuiltinFont { size: Pt(size), font },
            Op::WriteTextBuiltinFont { items: vec![TextItem::Text(text)], font },
            Op::EndTextSection,
        ]);
    }
}

fn attempt_cells(row: &AttemptReportRow) -> [String; 6] {
    [
        row.student_full_name(),
        row.student_username.clone(),
        row.quiz_title.clone(),
        format_score(row.score),
        format_minutes(row.started_at),
        row.submitted_at.map(format_minutes).unwrap_or_default(),
    ]
}

pub(crate) fn attempts_workbook(rows: &[AttemptReportRow]) -> Result<Vec<u8>, ReportError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("AllAttempts")?;

    let header_format = Format::new().set_bold();
    for (col, header) in ATTEMPT_HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
        worksheet.set_column_width(col as u16, if col == 2 { 32.0 } else { 20.0 })?;
    }

    for (index, row) in rows.iter().enumerate() {
        let line = index as u32 + 1;
        let [student, username, quiz, _, started, completed] = attempt_cells(row);
        worksheet.write_string(line, 0, student)?;
        worksheet.write_string(line, 1, username)?;
        worksheet.write_string(line, 2, quiz)?;
        worksheet.write_number(line, 3, row.score)?;
        worksheet.write_string(line, 4, started)?;
        worksheet.write_string(line, 5, completed)?;
    }

    let mut cursor = Cursor::new(Vec::new());
    workbook.save_to_writer(&mut cursor)?;
    Ok(cursor.into_inner())
}

pub(crate) fn attempts_pdf(rows: &[AttemptReportRow]) -> Vec<u8> {
    const COLUMNS: [f32; 6] = [LEFT_MM, 52.0, 80.0, 128.0, 143.0, 170.0];
    const WIDTHS: [usize; 6] = [22, 16, 28, 8, 16, 16];

    let mut report = PdfReport::new("All Attempts Results");
    report.text(LEFT_MM, "All Attempts Results".to_string(), BuiltinFont::HelveticaBold, 16.0, 10.0);

    let header: Vec<(f32, String)> = COLUMNS
        .iter()
        .zip(ATTEMPT_HEADERS.iter())
        .map(|(x, label)| (*x, (*label).to_string()))
        .collect();
    report.row(&header, BuiltinFont::HelveticaBold, 8.0, 4.0);
    report.rule();

    for row in rows {
        let cells: Vec<(f32, String)> = attempt_cells(row)
            .iter()
            .zip(COLUMNS.iter().zip(WIDTHS.iter()))
            .map(|(value, (x, width))| (*x, truncate_with_ellipsis(value, *width)))
            .collect();
        report.row(&cells, BuiltinFont::Helvetica, 8.0, 5.0);
    }

    report.finish()
}

pub(crate) struct StudentResultSection {
    pub(crate) attempt: AttemptReportRow,
    pub(crate) wrong_questions: Vec<String>,
}

pub(crate) fn student_results_pdf(
    school_name: &str,
    student_name: &str,
    sections: &[StudentResultSection],
) -> Vec<u8> {
    let mut report = PdfReport::new(&format!("{student_name} results"));
    report.text(LEFT_MM, school_name.to_uppercase(), BuiltinFont::HelveticaBold, 16.0, 8.0);
    report.text(LEFT_MM, format!("Student: {student_name}"), BuiltinFont::Helvetica, 12.0, 14.0);

    for section in sections {
        let attempt = &section.attempt;
        report.text(
            LEFT_MM,
            format!("Quiz: {} ({})", attempt.quiz_title, attempt.subject_name),
            BuiltinFont::HelveticaBold,
            13.0,
            7.0,
        );
        report.text(
            LEFT_MM + 7.0,
            format!(
                "Score: {}/{} | Pending: {}",
                format_score(attempt.score),
                format_score(attempt.total_marks),
                attempt.pending_count
            ),
            BuiltinFont::Helvetica,
            11.0,
            7.0,
        );

        if !section.wrong_questions.is_empty() {
            report.text(
                LEFT_MM + 7.0,
                "Review of Wrong Answers:".to_string(),
                BuiltinFont::HelveticaOblique,
                11.0,
                7.0,
            );
            for question in &section.wrong_questions {
                report.text(
                    LEFT_MM + 14.0,
                    format!("- {}", truncate_with_ellipsis(question, 60)),
                    BuiltinFont::HelveticaOblique,
                    11.0,
                    5.5,
                );
            }
        }
        report.gap(5.0);
    }

    report.finish()
}

pub(crate) fn class_results_pdf(
    school_name: &str,
    teacher_name: &str,
    rows: &[AttemptReportRow],
) -> Vec<u8> {
    let mut report = PdfReport::new("Class results");
    report.text(LEFT_MM, school_name.to_uppercase(), BuiltinFont::HelveticaBold, 16.0, 8.0);
    report.text(LEFT_MM, format!("Teacher: {teacher_name}"), BuiltinFont::Helvetica, 12.0, 14.0);

    let mut current_quiz: Option<&str> = None;
    for row in rows {
        if current_quiz != Some(row.quiz_id.as_str()) {
            if current_quiz.is_some() {
                report.gap(4.0);
            }
            report.text(
                LEFT_MM,
                format!("Quiz: {}", row.quiz_title),
                BuiltinFont::HelveticaBold,
                13.0,
                7.0,
            );
            current_quiz = Some(row.quiz_id.as_str());
        }
        report.text(
            LEFT_MM + 7.0,
            format!(
                "Student: {} | Score: {}/{} | Pending: {}",
                row.student_full_name(),
                format_score(row.score),
                format_score(row.total_marks),
                row.pending_count
            ),
            BuiltinFont::Helvetica,
            11.0,
            7.0,
        );
    }

    report.finish()
}

pub(crate) struct UsersSummary {
    pub(crate) total: i64,
    pub(crate) students: i64,
    pub(crate) teachers: i64,
    pub(crate) admins: i64,
}

pub(crate) fn admin_results_pdf(
    school_name: &str,
    admin_name: &str,
    leaderboard: &[LeaderboardRow],
    users: &UsersSummary,
) -> Vec<u8> {
    let mut report = PdfReport::new("Overall results");
    report.text(LEFT_MM, school_name.to_uppercase(), BuiltinFont::HelveticaBold, 16.0, 8.0);
    report.text(LEFT_MM, format!("Admin: {admin_name}"), BuiltinFont::Helvetica, 12.0, 14.0);

    report.text(
        LEFT_MM,
        "Leaderboard (Top Students)".to_string(),
        BuiltinFont::HelveticaBold,
        13.0,
        7.0,
    );
    for (index, row) in leaderboard.iter().enumerate() {
        let joined = format!("{} {}", row.first_name.trim(), row.last_name.trim());
        let name = if joined.trim().is_empty() { row.username.clone() } else { joined.trim().to_string() };
        report.text(
            LEFT_MM + 7.0,
            format!("{}. {} - {} points", index + 1, name, format_score(row.avg_score)),
            BuiltinFont::Helvetica,
            11.0,
            7.0,
        );
    }

    report.gap(6.0);
    report.text(LEFT_MM, "Users Summary".to_string(), BuiltinFont::HelveticaBold, 13.0, 7.0);
    for line in [
        format!("Total Users: {}", users.total),
        format!("Students: {}", users.students),
        format!("Teachers: {}", users.teachers),
        format!("Admins: {}", users.admins),
    ] {
        report.text(LEFT_MM + 7.0, line, BuiltinFont::Helvetica, 11.0, 7.0);
    }

    report.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn attempt_row(quiz_id: &str, score: f64) -> AttemptReportRow {
        AttemptReportRow {
            attempt_id: format!("attempt-{quiz_id}-{score}"),
            quiz_id: quiz_id.to_string(),
            quiz_title: format!("Quiz {quiz_id}"),
            subject_name: "Biology".to_string(),
            student_username: "ada".to_string(),
            student_first_name: "Ada".to_string(),
            student_last_name: "Obi".to_string(),
            score,
            total_marks: 10.0,
            started_at: datetime!(2025-02-01 08:00:00),
            submitted_at: Some(datetime!(2025-02-01 08:25:00)),
            pending_count: 1,
        }
    }

    #[test]
    fn score_formatting_trims_zeroes() {
        assert_eq!(format_score(7.0), "7");
        assert_eq!(format_score(7.5), "7.5");
        assert_eq!(format_score(7.126), "7.13");
    }

    #[test]
    fn truncation_appends_ellipsis_only_when_needed() {
        assert_eq!(truncate_with_ellipsis("short", 60), "short");
        let long = "x".repeat(61);
        assert_eq!(truncate_with_ellipsis(&long, 60), format!("{}...", "x".repeat(60)));
    }

    #[test]
    fn attempt_cells_use_minute_timestamps() {
        let cells = attempt_cells(&attempt_row("q1", 8.0));
        assert_eq!(cells[0], "Ada Obi");
        assert_eq!(cells[3], "8");
        assert_eq!(cells[4], "2025-02-01 08:00");
        assert_eq!(cells[5], "2025-02-01 08:25");
    }

    #[test]
    fn long_reports_paginate() {
        let mut report = PdfReport::new("paging");
        for index in 0..200 {
            report.text(LEFT_MM, format!("line {index}"), BuiltinFont::Helvetica, 10.0, 6.0);
        }
        assert!(report.page_count() > 1);
        let bytes = report.finish();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn pdf_builders_produce_documents() {
        let rows = vec![attempt_row("q1", 8.0), attempt_row("q1", 6.5), attempt_row("q2", 3.0)];
        assert!(attempts_pdf(&rows).starts_with(b"%PDF"));
        assert!(class_results_pdf("Hill School", "Mr Eze", &rows).starts_with(b"%PDF"));

        let sections = vec![StudentResultSection {
            attempt: attempt_row("q1", 8.0),
            wrong_questions: vec!["Which organelle produces energy for the cell?".to_string()],
        }];
        assert!(student_results_pdf("Hill School", "Ada Obi", &sections).starts_with(b"%PDF"));

        let summary = UsersSummary { total: 3, students: 2, teachers: 1, admins: 0 };
        assert!(admin_results_pdf("Hill School", "Admin", &[], &summary).starts_with(b"%PDF"));
    }

    #[test]
    fn attempts_workbook_is_a_zip_container() {
        let bytes = attempts_workbook(&[attempt_row("q1", 8.0)]).expect("xlsx");
        assert!(bytes.starts_with(b"PK"));
    }
}
