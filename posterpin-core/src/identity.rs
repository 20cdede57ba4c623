use posterpin_model::UserId;

use crate::contract::{ACCOUNT_LINK, RESERVED_PATH_SEGMENTS};
use crate::page::HostPage;

/// Who is looking, and whose profile is being looked at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Logged-in account.
    pub viewer: Option<UserId>,
    /// Owner of the profile in the URL, when that is someone other than the
    /// viewer.
    pub profile: Option<UserId>,
}

impl Identity {
    /// Whose poster map applies on this page: the profile owner when browsing
    /// someone else's pages, the viewer otherwise.
    pub fn active_user(&self) -> Option<&UserId> {
        self.profile.as_ref().or(self.viewer.as_ref())
    }

    /// Every distinct user whose map should be refreshed.
    pub fn observed_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.profile.iter().cloned().collect();
        if let Some(viewer) = &self.viewer
            && !users.contains(viewer)
        {
            users.push(viewer.clone());
        }
        users
    }
}

/// Read the logged-in account from the account menu link.
pub fn logged_in_user(page: &dyn HostPage) -> Option<UserId> {
    page.query_first(page.document(), &ACCOUNT_LINK)
        .and_then(|link| UserId::new(page.text_content(link)).ok())
}

/// Profile owner named by the first path segment, excluding site sections and
/// the viewer's own profile.
pub fn profile_user(path: &str, viewer: Option<&UserId>) -> Option<UserId> {
    let segment = path.split('/').nth(1)?;
    let user = UserId::new(segment).ok()?;
    if RESERVED_PATH_SEGMENTS.contains(&user.as_str()) || Some(&user) == viewer {
        return None;
    }
    Some(user)
}

pub fn resolve(page: &dyn HostPage) -> Identity {
    let viewer = logged_in_user(page);
    let profile = profile_user(&page.location_path(), viewer.as_ref());
    Identity { viewer, profile }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{ElementSpec, MemoryPage};

    fn page_with_account(path: &str, account: &str) -> MemoryPage {
        let page = MemoryPage::new(path);
        page.insert(
            page.body(),
            ElementSpec::new("nav").child(ElementSpec::new("a").attr("href", "#").text(account)),
        );
        page
    }

    #[test]
    fn viewer_on_film_page_has_no_profile() {
        let identity = resolve(&page_with_account("/film/dune-2021/", " Alice "));
        assert_eq!(identity.viewer.as_ref().map(UserId::as_str), Some("alice"));
        assert_eq!(identity.profile, None);
        assert_eq!(identity.active_user().map(UserId::as_str), Some("alice"));
        assert_eq!(identity.observed_users().len(), 1);
    }

    #[test]
    fn other_profile_takes_precedence() {
        let identity = resolve(&page_with_account("/Bob/films/", "alice"));
        assert_eq!(identity.profile.as_ref().map(UserId::as_str), Some("bob"));
        assert_eq!(identity.active_user().map(UserId::as_str), Some("bob"));
        assert_eq!(identity.observed_users().len(), 2);
    }

    #[test]
    fn own_profile_and_sections_are_not_profiles() {
        let alice = UserId::new("alice").unwrap();
        assert_eq!(profile_user("/alice/", Some(&alice)), None);
        for section in RESERVED_PATH_SEGMENTS {
            assert_eq!(profile_user(&format!("/{section}/x/"), Some(&alice)), None);
        }
        assert_eq!(profile_user("/", None), None);
    }

    #[test]
    fn anonymous_visitor_has_no_viewer() {
        let page = MemoryPage::new("/bob/");
        let identity = resolve(&page);
        assert_eq!(identity.viewer, None);
        assert_eq!(identity.active_user().map(UserId::as_str), Some("bob"));
    }
}
