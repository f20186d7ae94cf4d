/*!
 * Story context merging.
 *
 * Characters, terms and settings are keyed by their normalized identity
 * (trimmed, lowercased). The first occurrence of a key fixes its position;
 * a later entry replaces the stored one only when its description (or
 * meaning) is strictly longer, counted in characters. Plot points are
 * appended and windowed to the most recent `PLOT_POINT_WINDOW`.
 */

use std::collections::HashMap;

use super::model::{
    normalize_key, Character, ExtractedContext, PlotPoint, Setting, StoryContext, Term,
    PLOT_POINT_WINDOW,
};

/// Merge a newly extracted context into the stored story context, if any.
///
/// The first context of a story is stored exactly as extracted.
pub fn merge(existing: Option<&StoryContext>, incoming: ExtractedContext) -> ExtractedContext {
    match existing {
        Some(stored) => merge_contexts(&stored.context, incoming),
        None => incoming,
    }
}

/// Merge two contexts, `existing` entries first
pub fn merge_contexts(existing: &ExtractedContext, incoming: ExtractedContext) -> ExtractedContext {
    let characters = merge_keyed(
        existing.characters.iter().cloned().chain(incoming.characters),
        |c: &Character| c.name.as_str(),
        |c: &Character| c.description.as_str(),
    );
    let terms = merge_keyed(
        existing.terms.iter().cloned().chain(incoming.terms),
        |t: &Term| t.term.as_str(),
        |t: &Term| t.meaning.as_str(),
    );
    let settings = merge_keyed(
        existing.settings.iter().cloned().chain(incoming.settings),
        |s: &Setting| s.location.as_str(),
        |s: &Setting| s.description.as_str(),
    );

    let mut plot_points: Vec<PlotPoint> = existing
        .plot_points
        .iter()
        .cloned()
        .chain(incoming.plot_points)
        .collect();
    window_plot_points(&mut plot_points);

    ExtractedContext {
        characters,
        terms,
        settings,
        plot_points,
    }
}

/// Keep only the trailing `PLOT_POINT_WINDOW` plot points
pub fn window_plot_points(plot_points: &mut Vec<PlotPoint>) {
    if plot_points.len() > PLOT_POINT_WINDOW {
        let excess = plot_points.len() - PLOT_POINT_WINDOW;
        plot_points.drain(..excess);
    }
}

fn merge_keyed<T, I, K, D>(entries: I, key_of: K, detail_of: D) -> Vec<T>
where
    I: IntoIterator<Item = T>,
    K: Fn(&T) -> &str,
    D: Fn(&T) -> &str,
{
    let mut merged: Vec<T> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        let key = normalize_key(key_of(&entry));
        match positions.get(&key) {
            Some(&index) => {
                let current_len = detail_of(&merged[index]).chars().count();
                if detail_of(&entry).chars().count() > current_len {
                    merged[index] = entry;
                }
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(entry);
            }
        }
    }

    merged
}
