use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// Loads the ordered class-label list, one label per line. The order is the
/// model's output-index order and is part of the model artifact's contract.
pub fn load_class_labels(filepath: &Path) -> io::Result<Vec<String>> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let label = line.trim();
        if label.is_empty() {
            continue;
        }
        labels.push(label.to_string());
    }

    if labels.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("no class labels in {}", filepath.display()),
        ));
    }

    Ok(labels)
}
