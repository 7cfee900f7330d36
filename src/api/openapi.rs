use super::handlers::{
    auth, billing, coupons, health, members, panel_users, plans, referrals, status,
};
use utoipa::openapi::{InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec. Handlers sharing a path must
/// be registered in the same `routes!` call.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut openapi = cargo_openapi();

    let mut panel_tag = Tag::new("panel");
    panel_tag.description = Some("Panel user management and presence".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("OTP login and admin sessions".to_string());

    let mut regions_tag = Tag::new("regions");
    regions_tag.description = Some("Regional members, coupons, referrals and plans".to_string());

    let mut billing_tag = Tag::new("billing");
    billing_tag.description = Some("Payment aggregation and dashboard".to_string());

    let mut status_tag = Tag::new("status");
    status_tag.description = Some("Third-party API health probes".to_string());

    openapi.tags = Some(vec![
        panel_tag,
        auth_tag,
        regions_tag,
        billing_tag,
        status_tag,
    ]);

    OpenApiRouter::with_openapi(openapi)
        .routes(routes!(health::health))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::verify::verify_otp))
        .routes(routes!(auth::session::session))
        .routes(routes!(auth::session::logout))
        .routes(routes!(auth::presence::online_admins))
        .routes(routes!(
            panel_users::list_panel_users,
            panel_users::create_panel_user
        ))
        .routes(routes!(
            panel_users::patch_panel_user,
            panel_users::delete_panel_user
        ))
        .routes(routes!(members::list_members))
        .routes(routes!(members::get_member, members::delete_member))
        .routes(routes!(coupons::list_coupons, coupons::create_coupon))
        .routes(routes!(coupons::patch_coupon, coupons::delete_coupon))
        .routes(routes!(referrals::list_referrals, referrals::create_referral))
        .routes(routes!(referrals::patch_referral, referrals::delete_referral))
        .routes(routes!(plans::list_plans, plans::create_plan))
        .routes(routes!(plans::patch_plan, plans::delete_plan))
        .routes(routes!(billing::billing_summary))
        .routes(routes!(billing::list_payments))
        .routes(routes!(billing::dashboard))
        .routes(routes!(status::api_status))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    let identifier = env!("CARGO_PKG_LICENSE");
    if !identifier.is_empty() {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        info.license = Some(license);
    }

    OpenApiBuilder::new().info(info).build()
}
