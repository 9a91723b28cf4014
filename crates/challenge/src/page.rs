/// Interstitial served with status 503 to clients holding no clearance.
///
/// The page waits two seconds (long enough to be expensive for naive
/// scripts, short enough not to annoy people) and then reloads with the
/// signed token as a query parameter, which the gateway promotes into an
/// HttpOnly cookie. A client with no JS engine never follows the redirect.
pub fn challenge_page(redirect_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <title>AegisEdge &mdash; Checking your browser</title>
    <style>
      body {{ font-family: sans-serif; display:flex; align-items:center; justify-content:center; height:100vh; margin:0; background:#0d1117; color:#cdd9e5; }}
      .box {{ text-align:center; }}
      .spinner {{ width:40px; height:40px; border:4px solid #30363d; border-top-color:#58a6ff; border-radius:50%; animation:spin 0.8s linear infinite; margin:1rem auto; }}
      @keyframes spin {{ to {{ transform: rotate(360deg); }} }}
    </style>
  </head>
  <body>
    <div class="box">
      <div class="spinner"></div>
      <h2>Checking your browser&hellip;</h2>
      <p>AegisEdge Security &mdash; one moment please.</p>
      <script>
        setTimeout(function() {{
          window.location.href = "{redirect_url}";
        }}, 2000);
      </script>
    </div>
  </body>
</html>"#
    )
}
