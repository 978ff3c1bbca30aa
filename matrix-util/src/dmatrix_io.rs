use crate::common_io::{read_lines_of_types, read_lines_of_words_delim, write_lines, Delimiter};
use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};

use std::fmt::{Debug, Display};
use std::str::FromStr;

impl<T> IoOps for DMatrix<T>
where
    T: nalgebra::Scalar + Send + FromStr + Display + Copy,
    <T as FromStr>::Err: Debug,
{
    type Scalar = T;
    type Mat = Self;

    fn read_file_delim(
        tsv_file: &str,
        delim: impl Into<Delimiter>,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat> {
        let hdr_line = match skip {
            Some(skip) => skip as i64,
            None => -1, // no skipping
        };

        let data = read_lines_of_types::<T>(tsv_file, delim, hdr_line)?.lines;

        if data.is_empty() {
            return Err(anyhow::anyhow!("No data in file {}", tsv_file));
        }

        let ncols = data[0].len();
        let nrows = data.len();

        if let Some(bad) = data.iter().position(|row| row.len() != ncols) {
            return Err(anyhow::anyhow!(
                "line {} has {} fields, expected {}",
                bad,
                data[bad].len(),
                ncols
            ));
        }

        let data = data.into_iter().flatten().collect::<Vec<_>>();

        Ok(DMatrix::<T>::from_row_iterator(nrows, ncols, data))
    }

    fn read_names_delim(
        file: &str,
        delim: impl Into<Delimiter>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>> {
        let out = read_lines_of_words_delim(file, delim, 0)?;

        if out.lines.is_empty() {
            return Err(anyhow::anyhow!("No data in file {}", file));
        }

        let ncols = out.lines[0].len().saturating_sub(1);

        // the header may or may not carry a name for the row-name column
        let cols: Vec<Box<str>> = if out.header.len() == ncols + 1 {
            out.header[1..].to_vec()
        } else if out.header.len() == ncols {
            out.header
        } else {
            return Err(anyhow::anyhow!(
                "header has {} fields, but rows have {} values",
                out.header.len(),
                ncols
            ));
        };

        let nrows = out.lines.len();
        let mut rows = Vec::with_capacity(nrows);
        let mut data = Vec::with_capacity(nrows * ncols);

        for (i, words) in out.lines.into_iter().enumerate() {
            if words.len() != ncols + 1 {
                return Err(anyhow::anyhow!(
                    "row {} has {} fields, expected {}",
                    i,
                    words.len(),
                    ncols + 1
                ));
            }
            let mut words = words.into_iter();
            if let Some(name) = words.next() {
                rows.push(name);
            }
            for w in words {
                let x = w
                    .parse::<T>()
                    .map_err(|e| anyhow::anyhow!("failed to parse '{}': {:?}", w, e))?;
                data.push(x);
            }
        }

        Ok(MatWithNames {
            rows,
            cols,
            mat: DMatrix::<T>::from_row_iterator(nrows, ncols, data),
        })
    }

    fn write_file_delim(&self, tsv_file: &str, delim: &str) -> anyhow::Result<()> {
        // par_iter() or par_bridge() will
        // mess up the order of the rows
        let lines = self
            .row_iter()
            .map(|row| {
                row.iter()
                    .map(|x| format!("{}", *x))
                    .collect::<Vec<String>>()
                    .join(delim)
                    .into_boxed_str()
            })
            .collect::<Vec<_>>();

        write_lines(&lines, tsv_file)?;
        Ok(())
    }

    fn write_names_delim(
        &self,
        rows: &[Box<str>],
        cols: &[Box<str>],
        file: &str,
        delim: &str,
    ) -> anyhow::Result<()> {
        if rows.len() != self.nrows() || cols.len() != self.ncols() {
            return Err(anyhow::anyhow!(
                "names ({} x {}) don't match the matrix ({} x {})",
                rows.len(),
                cols.len(),
                self.nrows(),
                self.ncols()
            ));
        }

        let mut lines = Vec::with_capacity(self.nrows() + 1);

        let hdr = std::iter::once("name")
            .chain(cols.iter().map(|c| c.as_ref()))
            .collect::<Vec<_>>()
            .join(delim);
        lines.push(hdr.into_boxed_str());

        for (name, row) in rows.iter().zip(self.row_iter()) {
            let line = std::iter::once(name.to_string())
                .chain(row.iter().map(|x| format!("{}", *x)))
                .collect::<Vec<String>>()
                .join(delim);
            lines.push(line.into_boxed_str());
        }

        write_lines(&lines, file)
    }
}
