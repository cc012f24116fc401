//! Errata lookup for one system

use fleetkit::{AdvisoryType, Client, Erratum, SystemId};

/// Keyword an advisory carries when the patch wants a reboot afterwards
pub const REBOOT_SUGGESTED: &str = "reboot_suggested";

/// Keyword an advisory carries when the patched service wants a restart
pub const RESTART_SUGGESTED: &str = "restart_suggested";

/// Part of the software-management stack a patch updates.
///
/// Stack patches go into the chain ahead of everything else, package
/// manager first, so the rest is installed by an up-to-date stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackComponent {
    /// zypper, libzypp and the zlib they link against
    PackageManager,
    /// The salt minion driving the system
    Salt,
}

impl StackComponent {
    /// Installation order
    pub const ORDER: [Self; 2] = [Self::PackageManager, Self::Salt];

    /// Lowercase synopsis fragments identifying the component
    fn markers(self) -> &'static [&'static str] {
        match self {
            Self::PackageManager => &["zypp", "zlib"],
            Self::Salt => &["salt"],
        }
    }

    /// Component a patch belongs to, by synopsis. A synopsis naming both
    /// counts for the first in [`StackComponent::ORDER`].
    pub fn of(erratum: &Erratum) -> Option<Self> {
        let synopsis = erratum.advisory_synopsis.to_lowercase();
        Self::ORDER
            .into_iter()
            .find(|c| c.markers().iter().any(|m| synopsis.contains(m)))
    }
}

/// Relevant errata of one system, fetched once and cached.
pub struct ErrataInspector<'a> {
    client: &'a Client,
    sid: SystemId,
    categories: &'a [AdvisoryType],
    errata: Option<Vec<Erratum>>,
}

impl<'a> ErrataInspector<'a> {
    pub fn new(client: &'a Client, sid: SystemId, categories: &'a [AdvisoryType]) -> Self {
        Self {
            client,
            sid,
            categories,
            errata: None,
        }
    }

    /// Errata for the system, fetched on first use.
    ///
    /// With `All` among the categories one query covers everything; otherwise
    /// one query per category, results concatenated in category order.
    pub fn errata(&mut self) -> fleetkit::Result<&[Erratum]> {
        if self.errata.is_none() {
            let fetched = if self.categories.contains(&AdvisoryType::All) {
                self.client.relevant_errata(self.sid)?
            } else {
                let mut all = Vec::new();
                for category in self.categories {
                    let found = self.client.relevant_errata_by_type(self.sid, *category)?;
                    log::debug!("System {}: {} {category} patch(es)", self.sid, found.len());
                    all.extend(found);
                }
                all
            };
            self.errata = Some(fetched);
        }
        Ok(self.errata.as_deref().unwrap_or_default())
    }

    /// Ids of the patches updating one stack component.
    pub fn stack_ids(&mut self, component: StackComponent) -> fleetkit::Result<Vec<i64>> {
        Ok(self
            .errata()?
            .iter()
            .filter(|e| StackComponent::of(e) == Some(component))
            .map(|e| e.id)
            .collect())
    }

    /// Ids of the patches outside the software-management stack.
    pub fn other_ids(&mut self) -> fleetkit::Result<Vec<i64>> {
        Ok(self
            .errata()?
            .iter()
            .filter(|e| StackComponent::of(e).is_none())
            .map(|e| e.id)
            .collect())
    }

    /// Whether any patch in the set suggests a reboot.
    ///
    /// One keyword lookup per patch, stopping at the first hit.
    pub fn suggests_reboot(&mut self) -> fleetkit::Result<bool> {
        let client = self.client;
        let errata = self.errata()?;
        first_with_keyword(client, errata.iter(), REBOOT_SUGGESTED)
    }

    /// Whether a salt patch asks for the minion to be restarted.
    pub fn suggests_stack_restart(&mut self) -> fleetkit::Result<bool> {
        let client = self.client;
        let salt = self
            .errata()?
            .iter()
            .filter(|e| StackComponent::of(e) == Some(StackComponent::Salt));
        first_with_keyword(client, salt, RESTART_SUGGESTED)
    }
}

fn first_with_keyword<'e>(
    client: &Client,
    errata: impl Iterator<Item = &'e Erratum>,
    keyword: &str,
) -> fleetkit::Result<bool> {
    for erratum in errata {
        let keywords = client.errata_keywords(&erratum.advisory_name)?;
        if keywords.iter().any(|k| k == keyword) {
            log::debug!("{} carries {keyword}", erratum.advisory_name);
            return Ok(true);
        }
    }
    Ok(false)
}
