//! Spreadsheet rendering.
//!
//! The inventory is flattened to one row per tag. Project and repository
//! names are written once per group and merged vertically across the rows
//! the group spans, so the sheet reads as a tree:
//!
//! ```text
//! | Project | Repository | Tag    | Push Time           |
//! |---------|------------|--------|---------------------|
//! | library | nginx      | 1.25   | 2024-03-02 04:30:05 |
//! |         |            | latest | 2024-03-02 04:30:05 |
//! |         | redis      | 7      | 2024-02-11 10:00:00 |
//! ```

use camino::Utf8Path;
use chrono::FixedOffset;
use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, Worksheet};

use crate::domain::{Inventory, format_push_time};
use crate::error::ListerError;
use crate::fs_util;

pub const SHEET_NAME: &str = "Harbor Images";
pub const HEADERS: [&str; 4] = ["Project", "Repository", "Tag", "Push Time"];
const COLUMN_WIDTHS: [f64; 4] = [30.0, 40.0, 50.0, 20.0];
const HEADER_FILL: u32 = 0x1E90FF;

pub const PROJECT_COL: u16 = 0;
pub const REPOSITORY_COL: u16 = 1;
pub const TAG_COL: u16 = 2;
pub const PUSH_TIME_COL: u16 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub row: u32,
    pub tag: String,
    pub push_time: String,
}

/// A project or repository label covering `first_row..=last_row` in one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCell {
    pub col: u16,
    pub first_row: u32,
    pub last_row: u32,
    pub value: String,
}

impl GroupCell {
    pub fn is_merged(&self) -> bool {
        self.last_row > self.first_row
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetLayout {
    pub rows: Vec<TagRow>,
    pub groups: Vec<GroupCell>,
}

impl SheetLayout {
    pub fn from_inventory(inventory: &Inventory, offset: FixedOffset) -> Self {
        let mut layout = SheetLayout::default();
        // Row 0 holds the header.
        let mut next_row = 1u32;

        for project in &inventory.projects {
            let project_start = next_row;
            for repository in project.repositories.values() {
                let repo_start = next_row;
                for artifact in &repository.artifacts {
                    for tag in &artifact.tags {
                        layout.rows.push(TagRow {
                            row: next_row,
                            tag: tag.name.clone(),
                            push_time: format_push_time(tag.push_time.as_ref(), offset),
                        });
                        next_row += 1;
                    }
                }
                if next_row > repo_start {
                    layout.groups.push(GroupCell {
                        col: REPOSITORY_COL,
                        first_row: repo_start,
                        last_row: next_row - 1,
                        value: repository.name.clone(),
                    });
                }
            }
            if next_row > project_start {
                layout.groups.push(GroupCell {
                    col: PROJECT_COL,
                    first_row: project_start,
                    last_row: next_row - 1,
                    value: project.name.clone(),
                });
            }
        }

        layout
    }

    pub fn last_row(&self) -> u32 {
        self.rows.last().map(|row| row.row).unwrap_or(0)
    }
}

pub struct SheetWriter {
    offset: FixedOffset,
}

impl SheetWriter {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn render(&self, inventory: &Inventory) -> Result<Workbook, ListerError> {
        let layout = SheetLayout::from_inventory(inventory, self.offset);
        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(SHEET_NAME)?;
        write_header(worksheet)?;
        write_layout(worksheet, &layout)?;
        Ok(workbook)
    }

    pub fn save(&self, inventory: &Inventory, path: &Utf8Path) -> Result<(), ListerError> {
        let mut workbook = self.render(inventory)?;
        fs_util::ensure_parent_dir(path)?;
        fs_util::write_atomic(path, |temp| {
            workbook.save(temp)?;
            Ok(())
        })
    }
}

fn centered() -> Format {
    Format::new()
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter)
}

fn write_header(worksheet: &mut Worksheet) -> Result<(), ListerError> {
    let header = centered()
        .set_bold()
        .set_font_color(Color::White)
        .set_background_color(Color::RGB(HEADER_FILL));

    for (col, (title, width)) in HEADERS.iter().zip(COLUMN_WIDTHS).enumerate() {
        let col = col as u16;
        worksheet.write_string_with_format(0, col, *title, &header)?;
        worksheet.set_column_width(col, width)?;
    }
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn write_layout(worksheet: &mut Worksheet, layout: &SheetLayout) -> Result<(), ListerError> {
    let cell = centered();

    for row in &layout.rows {
        worksheet.write_string_with_format(row.row, TAG_COL, &row.tag, &cell)?;
        if row.push_time.is_empty() {
            worksheet.write_blank(row.row, PUSH_TIME_COL, &cell)?;
        } else {
            worksheet.write_string_with_format(row.row, PUSH_TIME_COL, &row.push_time, &cell)?;
        }
    }

    for group in &layout.groups {
        if group.is_merged() {
            worksheet.merge_range(
                group.first_row,
                group.col,
                group.last_row,
                group.col,
                &group.value,
                &cell,
            )?;
        } else {
            worksheet.write_string_with_format(group.first_row, group.col, &group.value, &cell)?;
        }
    }
    Ok(())
}
