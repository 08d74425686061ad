use crate::error::{Error, Result};
use crate::pivot::{ChartData, SeriesTable, SliceTable};
use std::io;

/// Convert an output to CSV
///
/// Series tables become one row per date with a `date` column followed by
/// one column per group; missing cells are written as empty fields.
/// Slice tables become `label,value` rows in slice order.
///
/// # Examples
/// ```
/// use trendboard::downloader::to_csv;
/// use trendboard::pivot::{ChartData, Slice, SliceTable};
///
/// let pie = ChartData::Slices(SliceTable {
///     slices: vec![Slice { label: "Asia".to_string(), value: 2.5 }],
/// });
/// assert_eq!(to_csv(&pie).unwrap(), "label,value\nAsia,2.5\n");
/// ```
pub fn to_csv(data: &ChartData) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    match data {
        ChartData::Series(table) => write_series(&mut writer, table)?,
        ChartData::Slices(table) => write_slices(&mut writer, table)?,
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn write_series<W: io::Write>(writer: &mut csv::Writer<W>, table: &SeriesTable) -> Result<()> {
    let mut header = vec!["date".to_string()];
    header.extend(table.columns.iter().cloned());
    writer.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![row.date.format("%Y-%m-%d").to_string()];
        record.extend(
            row.values
                .iter()
                .map(|value| value.map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    Ok(())
}

fn write_slices<W: io::Write>(writer: &mut csv::Writer<W>, table: &SliceTable) -> Result<()> {
    writer.write_record(["label", "value"])?;
    for slice in &table.slices {
        writer.write_record([slice.label.as_str(), slice.value.to_string().as_str()])?;
    }
    Ok(())
}

/// Convert an output to XLSX, laid out like [`to_csv`].
#[cfg(feature = "web")]
pub fn to_xlsx(data: &ChartData) -> Result<Vec<u8>> {
    use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};

    fn fill(worksheet: &mut Worksheet, data: &ChartData) -> std::result::Result<(), XlsxError> {
        match data {
            ChartData::Series(table) => {
                worksheet.write_string(0, 0, "date")?;
                for (c, column) in table.columns.iter().enumerate() {
                    worksheet.write_string(0, (c + 1) as u16, column)?;
                }
                for (r, row) in table.rows.iter().enumerate() {
                    let r = (r + 1) as u32;
                    worksheet.write_string(r, 0, row.date.format("%Y-%m-%d").to_string())?;
                    for (c, value) in row.values.iter().enumerate() {
                        if let Some(value) = value {
                            worksheet.write_number(r, (c + 1) as u16, *value)?;
                        }
                    }
                }
            }
            ChartData::Slices(table) => {
                worksheet.write_string(0, 0, "label")?;
                worksheet.write_string(0, 1, "value")?;
                for (r, slice) in table.slices.iter().enumerate() {
                    let r = (r + 1) as u32;
                    worksheet.write_string(r, 0, &slice.label)?;
                    worksheet.write_number(r, 1, slice.value)?;
                }
            }
        }
        Ok(())
    }

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    fill(&mut worksheet, data).map_err(|e| Error::Render(e.to_string()))?;
    workbook.push_worksheet(worksheet);
    workbook
        .save_to_buffer()
        .map_err(|e| Error::Render(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::Slice;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 8, d).unwrap()
    }

    #[test]
    fn series_keeps_missing_cells_empty() {
        let table = SeriesTable::pivot([("Asia", day(1), 1.5), ("Europe", day(2), 2.0)]);
        let csv = to_csv(&ChartData::Series(table)).unwrap();
        assert_eq!(csv, "date,Asia,Europe\n2020-08-01,1.5,\n2020-08-02,,2\n");
    }

    #[test]
    fn quotes_labels_with_commas() {
        let pie = ChartData::Slices(SliceTable {
            slices: vec![Slice {
                label: "Bonaire, Saint Eustatius and Saba".to_string(),
                value: 3.0,
            }],
        });
        let csv = to_csv(&pie).unwrap();
        assert_eq!(csv, "label,value\n\"Bonaire, Saint Eustatius and Saba\",3\n");
    }

    #[test]
    fn empty_series_has_only_a_header() {
        let csv = to_csv(&ChartData::Series(SeriesTable::default())).unwrap();
        assert_eq!(csv, "date\n");
    }

    #[cfg(feature = "web")]
    #[test]
    fn xlsx_is_a_zip_archive() {
        let table = SeriesTable::pivot([("Asia", day(1), 1.5)]);
        let bytes = to_xlsx(&ChartData::Series(table)).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
