use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render rows as a padded table: two spaces between columns, a dashed
/// rule under the header, no trailing padding on the last column.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let widths = column_widths(headers, &rows);
    let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    println!("{}", format_row(&widths, &header));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    println!("{}", format_row(&widths, &rule));
    for row in &rows {
        println!("{}", format_row(&widths, row));
    }
}

/// Health percentage as reported by the backend; 0 means never probed.
pub fn health_cell(health: u32) -> String {
    if health == 0 {
        "-".to_string()
    } else {
        format!("{health}%")
    }
}

pub fn latency_cell(latency: u64) -> String {
    if latency == 0 {
        "-".to_string()
    } else {
        format!("{latency}ms")
    }
}

fn column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .filter_map(|row| row.get(i))
                .map(String::len)
                .fold(header.len(), usize::max)
        })
        .collect()
}

fn format_row(widths: &[usize], cells: &[String]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{cell:<w$}"))
        .collect();
    padded.join("  ").trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_are_sized_by_widest_cell() {
        let rows = vec![
            vec!["conn-1".to_string(), "connected".to_string()],
            vec!["c2".to_string(), "syncing".to_string()],
        ];
        let widths = column_widths(&["ID", "STATUS"], &rows);
        assert_eq!(widths, vec![6, 9]);
        assert_eq!(
            format_row(&widths, &rows[1]),
            "c2      syncing"
        );
    }

    #[test]
    fn zero_metrics_render_as_dash() {
        assert_eq!(health_cell(0), "-");
        assert_eq!(health_cell(98), "98%");
        assert_eq!(latency_cell(0), "-");
        assert_eq!(latency_cell(42), "42ms");
    }
}
