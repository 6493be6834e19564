pub const CSS: &str = r#"
window {
    background: transparent;
}
.avatar { background: transparent; }
.badge {
    border-radius: 100px;
    min-width: 160px;
    min-height: 160px;
    color: #ffffff;
    font-size: 20px;
    font-weight: 700;
    text-shadow: 0 1px 2px rgba(0, 0, 0, 0.4);
}
.mood-idle { background: rgba(90, 90, 110, 0.85); }
.mood-thinking { background: rgba(118, 56, 250, 0.90); }
.mood-active { background: rgba(56, 200, 160, 0.90); }
.mood-happy { background: rgba(250, 190, 60, 0.90); }
.mood-angry { background: rgba(230, 60, 60, 0.92); }
"#;
