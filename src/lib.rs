//! # mdr-panel (Multi-Region Health Records Admin Panel)
//!
//! `mdr-panel` is the internal admin panel API for a health-records service
//! deployed in two independent regions (India, USA). It fronts three Postgres
//! databases: one product database per region (members, payments, coupons,
//! referral codes, plans) and a separate panel database (panel users, OTP
//! tokens, admin sessions, email outbox).
//!
//! ## Authentication (OTP)
//!
//! Admins sign in with a one-time 6-digit code delivered by email. Raw codes
//! and session tokens never touch the database; only SHA-256 hashes are
//! stored, with TTLs enforced in SQL. Verifying a code consumes it in a
//! single transaction and mints an `HttpOnly` session cookie.
//!
//! ## Regions
//!
//! The two regional schemas are migrated independently. Queries rely only on
//! a shared column subset, and cross-entity aggregation (payments joined to
//! members and plans) happens in-process rather than in SQL.
//!
//! ## Authorization
//!
//! Panel users hold the `admin` or `superadmin` role. Destructive operations
//! (panel user management, member deletion) require `superadmin` and fail
//! with `403 Forbidden` otherwise.

pub mod api;
pub mod cli;
