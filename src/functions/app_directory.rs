//! 应用目录：把智能体给出的应用名映射为应用 ID
//!
//! 匹配规则：取首个空格前的部分并转小写，与应用名或任一别名（同样小写）完全相等即命中。

use crate::config::AppEntry;

#[derive(Clone, Debug, Default)]
pub struct AppDirectory {
    entries: Vec<(u32, Vec<String>)>,
}

impl AppDirectory {
    pub fn new(apps: &[AppEntry]) -> Self {
        let entries = apps
            .iter()
            .map(|app| {
                let mut names: Vec<String> = std::iter::once(&app.name)
                    .chain(app.aliases.iter())
                    .map(|n| n.to_lowercase())
                    .collect();
                names.dedup();
                (app.id, names)
            })
            .collect();
        Self { entries }
    }

    pub fn resolve(&self, app_name: &str) -> Option<u32> {
        let target = normalize(app_name);
        if target.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|(_, names)| names.iter().any(|n| *n == target))
            .map(|(id, _)| *id)
    }
}

fn normalize(app_name: &str) -> String {
    app_name
        .trim()
        .split(' ')
        .next()
        .unwrap_or_default()
        .to_lowercase()
}
