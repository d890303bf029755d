use crate::model::LineCountTable;

impl LineCountTable {
    /// Build the table from `(batch, channel, file, lines)` entries.
    ///
    /// The minimum of a file is taken over the channels that reported it,
    /// so a file missing from some channel still gets one.
    pub fn from_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (String, String, String, usize)>,
    {
        let mut table = Self::default();
        for (batch, channel, file, lines) in counts {
            let minimum = table
                .minimums
                .entry(batch.clone())
                .or_default()
                .entry(file.clone())
                .or_insert(lines);
            *minimum = (*minimum).min(lines);

            table
                .lines
                .entry(batch)
                .or_default()
                .entry(channel)
                .or_default()
                .insert(file, lines);
        }
        table
    }

    pub fn lines(&self, batch: &str, channel: &str, file: &str) -> Option<usize> {
        self.lines.get(batch)?.get(channel)?.get(file).copied()
    }

    pub fn minimum(&self, batch: &str, file: &str) -> Option<usize> {
        self.minimums.get(batch)?.get(file).copied()
    }

    /// Line count above the batch minimum. A file without a recorded
    /// minimum is never unbalanced.
    pub fn is_unbalanced(&self, batch: &str, channel: &str, file: &str) -> bool {
        match self.lines(batch, channel, file) {
            Some(lines) => lines > self.minimum(batch, file).unwrap_or(usize::MAX),
            None => false,
        }
    }

    /// Channels of `batch`, sorted, with their counts for `file`.
    pub fn channels_with(&self, batch: &str, file: &str) -> Vec<(&str, usize)> {
        self.lines
            .get(batch)
            .map(|channels| {
                channels
                    .iter()
                    .filter_map(|(ch, files)| files.get(file).map(|&n| (ch.as_str(), n)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every `(batch, channel, file, lines)` in sorted order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &str, usize)> {
        self.lines.iter().flat_map(|(batch, channels)| {
            channels.iter().flat_map(move |(channel, files)| {
                files
                    .iter()
                    .map(move |(file, &n)| (batch.as_str(), channel.as_str(), file.as_str(), n))
            })
        })
    }

    pub fn checked_files(&self) -> usize {
        self.lines
            .values()
            .flat_map(|channels| channels.values())
            .map(|files| files.len())
            .sum()
    }
}
