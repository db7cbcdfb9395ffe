//! Bordered, column-aligned text tables
//!
//! Cells are owned strings laid out on a `width × height` grid, each with an
//! indentation level. Rendering sizes every column to its widest cell
//! (indentation included) and writes the whole table into a single
//! pre-sized buffer:
//!
//! ```text
//! |-------------|
//! | ID | NAME   |
//! |-------------|
//! | 1  |   main |
//! |-------------|
//! ```

use crate::error::{Result, StopwatchError};
use std::fmt;

/// Text table with optional header row and per-cell indentation
#[derive(Debug, Clone)]
pub struct StringTable {
    width: usize,
    height: usize,
    has_header: bool,
    indent_unit: usize,
    cells: Vec<String>,
    indents: Vec<usize>,
}

impl StringTable {
    /// Create an empty table
    ///
    /// `indent_unit` is the number of spaces per indentation level. When
    /// `has_header` is set, row 0 is separated from the body by a border.
    pub fn new(width: usize, height: usize, has_header: bool, indent_unit: usize) -> Self {
        let total = width * height;
        Self {
            width,
            height,
            has_header,
            indent_unit,
            cells: vec![String::new(); total],
            indents: vec![0; total],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn has_header(&self) -> bool {
        self.has_header
    }

    fn offset(&self, row: usize, col: usize) -> Result<usize> {
        if row >= self.height {
            return Err(StopwatchError::OutOfRange {
                index: row,
                limit: self.height,
            });
        }
        if col >= self.width {
            return Err(StopwatchError::OutOfRange {
                index: col,
                limit: self.width,
            });
        }
        Ok(row * self.width + col)
    }

    /// Store a copy of `value` at (`row`, `col`)
    pub fn set_cell(&mut self, value: &str, row: usize, col: usize) -> Result<()> {
        let idx = self.offset(row, col)?;
        self.cells[idx] = value.to_string();
        Ok(())
    }

    /// Store `value` formatted in base 10
    pub fn set_cell_int(&mut self, value: i64, row: usize, col: usize) -> Result<()> {
        let idx = self.offset(row, col)?;
        self.cells[idx] = value.to_string();
        Ok(())
    }

    /// Set the indentation level of a cell
    pub fn set_indent(&mut self, level: usize, row: usize, col: usize) -> Result<()> {
        let idx = self.offset(row, col)?;
        self.indents[idx] = level;
        Ok(())
    }

    pub fn cell(&self, row: usize, col: usize) -> Result<&str> {
        let idx = self.offset(row, col)?;
        Ok(&self.cells[idx])
    }

    pub fn indent(&self, row: usize, col: usize) -> Result<usize> {
        let idx = self.offset(row, col)?;
        Ok(self.indents[idx])
    }

    fn display_len(&self, idx: usize) -> usize {
        self.indents[idx] * self.indent_unit + self.cells[idx].chars().count()
    }

    /// Width of every column: the longest indented cell in that column
    pub fn column_widths(&self) -> Vec<usize> {
        (0..self.width)
            .map(|col| {
                (0..self.height)
                    .map(|row| self.display_len(row * self.width + col))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Render the table
    ///
    /// Every line, borders included, has the same number of characters.
    pub fn render(&self) -> String {
        let widths = self.column_widths();

        // "| " + content + " " per column, then "|\n"
        let row_chars: usize = widths.iter().map(|w| w + 3).sum::<usize>() + 2;
        let border_rows = 2 + usize::from(self.has_header && self.height > 0);
        let multibyte_extra: usize = self
            .cells
            .iter()
            .map(|cell| cell.len() - cell.chars().count())
            .sum();
        let capacity = row_chars * (self.height + border_rows) + multibyte_extra;

        let mut out = String::with_capacity(capacity);
        push_border(&mut out, row_chars);
        for row in 0..self.height {
            self.push_row(&mut out, &widths, row);
            if row == 0 && self.has_header {
                push_border(&mut out, row_chars);
            }
        }
        push_border(&mut out, row_chars);

        debug_assert_eq!(out.len(), capacity);
        out
    }

    fn push_row(&self, out: &mut String, widths: &[usize], row: usize) {
        for (col, width) in widths.iter().enumerate() {
            let idx = row * self.width + col;
            let indent = self.indents[idx] * self.indent_unit;
            let cell = &self.cells[idx];

            out.push_str("| ");
            push_spaces(out, indent);
            out.push_str(cell);
            push_spaces(out, width - indent - cell.chars().count() + 1);
        }
        out.push_str("|\n");
    }
}

impl fmt::Display for StringTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn push_border(out: &mut String, row_chars: usize) {
    for i in 0..row_chars {
        if i == 0 || i == row_chars - 2 {
            out.push('|');
        } else if i == row_chars - 1 {
            out.push('\n');
        } else {
            out.push('-');
        }
    }
}

fn push_spaces(out: &mut String, count: usize) {
    out.extend(std::iter::repeat(' ').take(count));
}
