//! Registry-backed appearance store

use winreg::enums::HKEY_CURRENT_USER;
use winreg::RegKey;

use super::{
    AppearanceError, AppearanceMode, AppearanceStore, APPS_USE_LIGHT_THEME, PERSONALIZE_SUBKEY,
    SYSTEM_USES_LIGHT_THEME,
};

/// Reads and writes `HKCU\...\Themes\Personalize`
#[derive(Debug, Default)]
pub struct RegistryAppearanceStore;

impl RegistryAppearanceStore {
    pub fn new() -> Self {
        Self
    }
}

impl AppearanceStore for RegistryAppearanceStore {
    fn read(&self) -> AppearanceMode {
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let key = match hkcu.open_subkey(PERSONALIZE_SUBKEY) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!("Personalize key not readable: {}", e);
                return AppearanceMode::Unknown;
            }
        };

        // get_value::<u32> rejects anything that is not a REG_DWORD
        match key.get_value::<u32, _>(SYSTEM_USES_LIGHT_THEME) {
            Ok(value) => AppearanceMode::from_flag(value),
            Err(e) => {
                tracing::debug!("{} not readable as DWORD: {}", SYSTEM_USES_LIGHT_THEME, e);
                AppearanceMode::Unknown
            }
        }
    }

    fn write(&mut self, mode: AppearanceMode) -> Result<(), AppearanceError> {
        let hkcu = RegKey::predef(HKEY_CURRENT_USER);
        let (key, _) = hkcu
            .create_subkey(PERSONALIZE_SUBKEY)
            .map_err(AppearanceError::Open)?;

        let flag = mode.flag();
        for name in [APPS_USE_LIGHT_THEME, SYSTEM_USES_LIGHT_THEME] {
            key.set_value(name, &flag)
                .map_err(|source| AppearanceError::Write { name, source })?;
        }

        tracing::debug!("Wrote appearance flags = {} ({})", flag, mode.effective());
        Ok(())
    }
}
