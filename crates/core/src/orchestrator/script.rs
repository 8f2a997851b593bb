//! Portal interaction sequences for each session step.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::case::CaseNumber;
use crate::config::PortalConfig;
use crate::session::{
    Action, Condition, Credentials, DownloadRequest, Selector, SessionDriver, SessionError,
};

/// Knows which pages, fields and controls each step touches.
pub struct PortalScript {
    portal: PortalConfig,
    credentials: Credentials,
}

impl PortalScript {
    pub fn new(portal: PortalConfig) -> Self {
        let credentials = Credentials {
            username: portal.username.clone(),
            password: portal.password.clone(),
        };
        Self {
            portal,
            credentials,
        }
    }

    fn selector(value: &str) -> Selector {
        Selector::parse(value)
    }

    pub async fn authenticate(&self, driver: &mut dyn SessionDriver) -> Result<(), SessionError> {
        driver.authenticate(&self.credentials).await
    }

    /// Load the search page and wait for its form.
    pub async fn open_search(
        &self,
        driver: &mut dyn SessionDriver,
        wait: Duration,
    ) -> Result<(), SessionError> {
        driver.navigate(&self.portal.search_url()).await?;
        let button = Self::selector(&self.portal.selectors.search_button);
        driver
            .wait_for(&Condition::ElementPresent(button), wait)
            .await
    }

    /// Values to type into the search form for a case number.
    ///
    /// Structured judicial numbers fill all four fields; anything else goes
    /// verbatim into the sequential field.
    pub fn search_fields(&self, case_number: &str) -> Vec<(Selector, String)> {
        let s = &self.portal.selectors;
        match CaseNumber::parse(case_number) {
            Ok(number) => vec![
                (Self::selector(&s.sequential_field), number.sequential),
                (Self::selector(&s.digit_field), number.digit),
                (Self::selector(&s.year_field), number.year),
                (Self::selector(&s.court_field), number.court),
            ],
            Err(_) => vec![(
                Self::selector(&s.sequential_field),
                case_number.trim().to_string(),
            )],
        }
    }

    /// Fill the search form and submit it.
    pub async fn search(
        &self,
        driver: &mut dyn SessionDriver,
        case_number: &str,
    ) -> Result<(), SessionError> {
        for (selector, value) in self.search_fields(case_number) {
            let field = driver.locate(&selector).await?;
            driver.interact(&field, &Action::Clear).await?;
            driver.interact(&field, &Action::Type(value)).await?;
        }

        let button = driver
            .locate(&Self::selector(&self.portal.selectors.search_button))
            .await?;
        driver.interact(&button, &Action::Click).await
    }

    /// Wait for the case in the result list and open it in its own window.
    pub async fn open_result(
        &self,
        driver: &mut dyn SessionDriver,
        case_number: &str,
        wait: Duration,
    ) -> Result<(), SessionError> {
        let link = Self::selector(&self.portal.selectors.result_link_for(case_number));
        driver
            .wait_for(&Condition::ElementPresent(link.clone()), wait)
            .await?;
        let element = driver.locate(&link).await?;
        driver.interact(&element, &Action::FollowLink).await
    }

    /// Open the download menu and fetch the artifact into `destination`.
    pub async fn download(
        &self,
        driver: &mut dyn SessionDriver,
        destination: PathBuf,
        wait: Duration,
        download_timeout: Duration,
    ) -> Result<PathBuf, SessionError> {
        let menu = Self::selector(&self.portal.selectors.download_menu);
        driver
            .wait_for(&Condition::ElementPresent(menu.clone()), wait)
            .await?;
        let element = driver.locate(&menu).await?;
        driver.interact(&element, &Action::Click).await?;

        debug!(destination = %destination.display(), "Triggering download");
        driver
            .trigger_download(&DownloadRequest {
                control: Self::selector(&self.portal.selectors.download_button),
                destination,
                timeout: download_timeout,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_fields_structured_number() {
        let script = PortalScript::new(PortalConfig::default());
        let fields = script.search_fields("5001234-56.2023.8.13.0024");
        let values: Vec<_> = fields.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, vec!["5001234", "56", "2023", "0024"]);
        assert_eq!(
            fields[0].0,
            Selector::Css("[id='fPP:numeroProcesso:numeroSequencial']".to_string())
        );
    }

    #[test]
    fn test_search_fields_unstructured_number() {
        let script = PortalScript::new(PortalConfig::default());
        let fields = script.search_fields(" 0001 ");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].1, "0001");
    }
}
