use std::collections::HashSet;

/// One suggestion read from the spreadsheet: columns A, B and C.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionRow {
    pub artist: String,
    pub track: String,
    pub suggested_by: String,
}

impl SuggestionRow {
    /// Builds a row from raw cells, or `None` when any of the three cells is
    /// missing or blank.
    pub fn from_cells(cells: &[String]) -> Option<Self> {
        let field = |i: usize| {
            cells
                .get(i)
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(str::to_owned)
        };
        Some(SuggestionRow {
            artist: field(0)?,
            track: field(1)?,
            suggested_by: field(2)?,
        })
    }

    // Apostrophes are stripped from the track name, the artist is used verbatim
    pub fn search_query(&self) -> String {
        format!(
            "track:{} NOT live NOT feat artist:{}",
            self.track.replace('\'', ""),
            self.artist
        )
    }
}

/// Parses raw spreadsheet rows, keeping the order and dropping incomplete rows.
pub fn parse_rows(rows: &[Vec<String>]) -> Vec<SuggestionRow> {
    rows.iter()
        .filter_map(|cells| SuggestionRow::from_cells(cells))
        .collect()
}

/// Top catalog search result for a suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMatch {
    pub track_id: Option<String>,
    pub display_name: String,
    pub artist_names: Vec<String>,
    pub external_url: Option<String>,
}

/// Track ids present in the destination playlist when the run started.
#[derive(Debug, Default)]
pub struct PlaylistMembership {
    track_ids: HashSet<String>,
}

impl PlaylistMembership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, track_id: String) {
        self.track_ids.insert(track_id);
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.track_ids.contains(track_id)
    }

    pub fn len(&self) -> usize {
        self.track_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.track_ids.is_empty()
    }
}

impl FromIterator<String> for PlaylistMembership {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        PlaylistMembership {
            track_ids: iter.into_iter().collect(),
        }
    }
}
