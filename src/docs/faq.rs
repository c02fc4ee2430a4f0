//! Canned answers for the most common platform questions.

use std::fmt::Write;

use super::corpus::DocsCorpus;

pub struct FaqEntry {
    pub topic: &'static str,
    pub question: &'static str,
    pub answer: &'static str,
}

pub const FAQ: &[FaqEntry] = &[
    FaqEntry {
        topic: "getting_started",
        question: "How do I get started with SAGE?",
        answer: r#"To get started with SAGE:

1. **Create an account**: Visit https://portal.sagecontinuum.org and sign in
2. **Explore existing data**: Use the Data Query Browser to see available sensor data
3. **Access sensors**: Learn about available sensors at different nodes
4. **Create edge apps**: Develop applications that run on edge nodes
5. **Submit jobs**: Schedule your applications to run on SAGE nodes

Key resources:
- Portal: https://portal.sagecontinuum.org
- Documentation: https://docs.sagecontinuum.org
- Data API: https://data.sagecontinuum.org/api/v1/query"#,
    },
    FaqEntry {
        topic: "plugin_development",
        question: "How do I create a SAGE plugin/edge app?",
        answer: r#"To create a SAGE plugin (edge app):

1. **Use the template**: Start with the cookiecutter template:
   ```bash
   pip3 install --upgrade cookiecutter
   cookiecutter gh:waggle-sensor/cookiecutter-sage-app
   ```

2. **Key components needed**:
   - `main.py`: Your main application code
   - `requirements.txt`: Python dependencies
   - `Dockerfile`: Container build instructions
   - `sage.yaml`: Plugin metadata

3. **Use PyWaggle**: Install and use the PyWaggle library:
   ```bash
   pip3 install pywaggle[all]
   ```

4. **Test on nodes**: Use `pluginctl` to build and test:
   ```bash
   sudo pluginctl build .
   sudo pluginctl run --name myapp <image>
   ```

5. **Publish to ECR**: Submit to Edge Code Repository at https://portal.sagecontinuum.org"#,
    },
    FaqEntry {
        topic: "data_access",
        question: "How do I access SAGE data?",
        answer: r#"To access SAGE data, you have several options:

1. **Python Sage Data Client** (recommended):
   ```python
   import sage_data_client
   df = sage_data_client.query(
       start="-1h",
       filter={"name": "env.temperature"}
   )
   ```

2. **HTTP API**:
   ```bash
   curl -H 'Content-Type: application/json' \
   https://data.sagecontinuum.org/api/v1/query -d '{
       "start": "-1h",
       "filter": {"sensor": "bme680"}
   }'
   ```

3. **Portal**: Use the Data Query Browser at https://portal.sagecontinuum.org

4. **Protected data**: Some data requires authentication - contact us for access."#,
    },
    FaqEntry {
        topic: "job_submission",
        question: "How do I submit jobs to SAGE nodes?",
        answer: r#"To submit jobs to SAGE nodes:

1. **Get sesctl tool**: Download from https://github.com/waggle-sensor/edge-scheduler/releases

2. **Create job YAML**:
   ```yaml
   name: myjob
   plugins:
   - name: my-plugin
     pluginSpec:
       image: registry.sagecontinuum.org/user/plugin:version
   nodes:
     W023: true
   scienceRules:
   - 'schedule("my-plugin"): cronjob("my-plugin", "*/5 * * * *")'
   ```

3. **Submit with sesctl**:
   ```bash
   export SES_HOST=https://es.sagecontinuum.org
   export SES_USER_TOKEN=<your-token>
   sesctl create --file-path myjob.yaml
   sesctl submit --job-id <job-id>
   ```

4. **Monitor**: Check status with `sesctl stat --job-id <job-id>`

From this server you can also use submit_plugin_job or submit_sage_job directly."#,
    },
    FaqEntry {
        topic: "sensors",
        question: "What sensors are available in SAGE?",
        answer: r#"SAGE nodes include various sensors:

**Environmental Sensors**:
- BME680: temperature, humidity, pressure, gas
- RG-15: rainfall measurements
- GPS: location data

**Cameras**:
- XNV-8080R: 5MP camera (92.1° horizontal view)
- XNV-8082R: 6MP camera (114° horizontal view)
- XNF-8010RV: 6MP fisheye (192° view)
- XNV-8081Z: 5MP PTZ camera

**Audio**:
- ETS ML1-WS: 20-16 kHz microphone

**Custom Sensors**:
- Software-defined Radio
- LIDAR systems
- Radiation detectors
- Mobotix infrared cameras

View all sensors: https://portal.sagecontinuum.org/sensors"#,
    },
    FaqEntry {
        topic: "troubleshooting",
        question: "How do I troubleshoot issues?",
        answer: r#"Common troubleshooting steps:

**Plugin Issues**:
1. Check logs: `pluginctl logs <plugin-name>`
2. Inspect pod: `sudo kubectl describe pod <pod-name>`
3. Check entrypoint in Dockerfile
4. Verify image builds: `sudo pluginctl build .`

**Job Issues**:
1. Check job status: `sesctl stat --job-id <id>` or check_job_status
2. Verify plugin is public in ECR
3. Check node permissions
4. Review science rules syntax

**Data Issues**:
1. Query recent data to verify publishing
2. Check measurement names and metadata
3. Verify timestamps and filters

**Access Issues**:
1. Ensure account is approved
2. Check SSH keys are uploaded
3. Verify tokens are current

Contact us at: https://docs.sagecontinuum.org/docs/contact-us"#,
    },
    FaqEntry {
        topic: "node_access",
        question: "How do I access SAGE nodes?",
        answer: r#"To access SAGE nodes:

1. **Get approved account**: Sign in at https://portal.sagecontinuum.org
2. **Setup SSH access**:
   - Go to Portal → Your Account → Access Creds
   - Follow "Update SSH Public Keys" instructions
   - Complete "Finish Setup for Node Access"

3. **Connect to development nodes**:
   ```bash
   ssh waggle-dev-node-W023  # example node
   ```

4. **Test connection**:
   ```bash
   ssh waggle-dev-sshd  # should return "no command provided"
   ```

**Note**: Node access is currently limited. Contact us for development node access.

**Available tools on nodes**:
- `pluginctl`: Build and test plugins
- `kubectl`: Manage containers
- Standard development tools"#,
    },
];

const MAX_FAQ_MATCHES: usize = 2;
const MAX_DOC_MATCHES: usize = 3;

pub fn topics() -> impl Iterator<Item = &'static str> {
    FAQ.iter().map(|entry| entry.topic)
}

/// `**question**\n\nanswer` for a topic, matched case-insensitively.
pub fn lookup(topic: &str) -> Option<String> {
    let topic = topic.trim().to_lowercase();
    FAQ.iter()
        .find(|entry| entry.topic == topic)
        .map(|entry| format!("**{}**\n\n{}", entry.question, entry.answer))
}

pub fn list_topics() -> String {
    let mut out = String::from("Available FAQ topics:");
    for topic in topics() {
        let _ = write!(out, "\n- {}", topic);
    }
    out
}

/// FAQ entries whose topic words appear in the question, then the best
/// documentation sections.
pub fn answer(corpus: &DocsCorpus, question: &str) -> String {
    let lower = question.to_lowercase();
    let faq_matches: Vec<&FaqEntry> = FAQ
        .iter()
        .filter(|entry| entry.topic.split('_').any(|word| lower.contains(word)))
        .take(MAX_FAQ_MATCHES)
        .collect();

    let mut parts: Vec<String> = Vec::new();
    if !faq_matches.is_empty() {
        parts.push("## Quick Answer (FAQ):".to_string());
        for entry in faq_matches {
            parts.push(format!("**{}**\n\n{}", entry.question, entry.answer));
            parts.push(String::new());
        }
    }

    let hits = corpus.search(question, MAX_DOC_MATCHES);
    if !hits.is_empty() {
        parts.push("## Additional Documentation:".to_string());
        for (i, hit) in hits.iter().enumerate() {
            parts.push(format!("**{}. {}**", i + 1, hit.title));
            parts.push(hit.preview.clone());
            parts.push(String::new());
        }
    }

    if parts.is_empty() {
        return format!(
            "I couldn't find specific information about '{}' in the documentation. \
             Try asking about: {} or contact us for help.",
            question,
            topics().collect::<Vec<_>>().join(", ")
        );
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let text = lookup("Data_Access").unwrap();
        assert!(text.starts_with("**How do I access SAGE data?**\n\n"));
        assert!(lookup("weather").is_none());
    }

    #[test]
    fn test_list_topics() {
        let list = list_topics();
        assert!(list.starts_with("Available FAQ topics:\n- getting_started"));
        assert_eq!(list.lines().count(), FAQ.len() + 1);
    }

    #[test]
    fn test_answer_faq_limit() {
        let corpus = DocsCorpus::default();
        // "access" matches both data_access and node_access, "data" matches data_access.
        let text = answer(&corpus, "how do I access data");
        assert!(text.starts_with("## Quick Answer (FAQ):"));
        assert!(text.contains("How do I access SAGE data?"));
        assert!(text.contains("How do I access SAGE nodes?"));
        assert!(!text.contains("Additional Documentation"));
    }

    #[test]
    fn test_answer_with_docs() {
        let corpus = DocsCorpus::from_markdown("# Cameras\nPTZ cameras rotate.\n");
        let text = answer(&corpus, "ptz cameras");
        assert!(text.starts_with("## Additional Documentation:\n**1. Cameras**"));
    }

    #[test]
    fn test_answer_nothing_found() {
        let text = answer(&DocsCorpus::default(), "zebra");
        assert!(text.starts_with("I couldn't find specific information about 'zebra'"));
        assert!(text.contains("getting_started, plugin_development"));
    }
}
