//! Sample suite run by the `playtest` binary
//!
//! The fixtures drive small in-memory UI models instead of a live game so
//! the runner can be exercised headless.

mod main_menu_tests;

pub use main_menu_tests::{MainMenuTests, MenuModel};
pub use settings_panel_tests::SettingsPanelTests;

use crate::catalog::{CatalogBuilder, ClassBuilder, TestCatalog};

pub fn sample_catalog() -> TestCatalog {
    CatalogBuilder::new()
        .namespace("Menus", |ns| {
            ns.class(
                ClassBuilder::<MainMenuTests>::new("MainMenuTests")
                    .test("title_is_shown", MainMenuTests::title_is_shown)
                    .smoke()
                    .coroutine("play_button_loads_level", MainMenuTests::play_button_loads_level)
                    .timeout_ms(5_000)
                    .async_test("settings_button_opens_panel", MainMenuTests::settings_button_opens_panel)
                    .smoke()
                    .test("credits_scroll", MainMenuTests::credits_scroll)
                    .ignore("credits screen not implemented"),
            )
            .class(
                ClassBuilder::<SettingsPanelTests>::new("SettingsPanelTests")
                    .async_test("volume_slider_applies", SettingsPanelTests::volume_slider_applies)
                    .async_test("fade_in_uses_real_time", SettingsPanelTests::fade_in_uses_real_time)
                    .target(1920, 1080)
                    .target(2560, 1440)
                    .test("resets_to_defaults", SettingsPanelTests::resets_to_defaults),
            )
        })
        .build()
}
